//! Parsing of `Name[option=value,...]` config strings.

use std::collections::HashMap;
use std::str::FromStr;

/// Splits `Name[options]` into the trimmed name and the options string, if any.
pub fn parse_config_value(config_str: &str) -> (String, Option<String>) {
    let Some((name, rest)) = config_str.split_once('[') else {
        return (config_str.trim().to_string(), None);
    };
    let options = rest.trim_end();
    let options = options.strip_suffix(']').unwrap_or(options);
    (name.trim().to_string(), Some(options.to_string()))
}

/// Collects `name=value` pairs separated by commas, pairs without `=` are ignored.
pub fn parse_options(options_str: &str) -> HashMap<String, String> {
    options_str
        .split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .collect()
}

/// Reads an option, falling back to `default` when it is absent.
///
/// Panics if the option is present but can not be parsed.
pub fn parse_option_or<T: FromStr>(options: &HashMap<String, String>, name: &str, default: T) -> T {
    match options.get(name) {
        Some(value) => value
            .parse::<T>()
            .unwrap_or_else(|_| panic!("Can't parse option {}={}", name, value)),
        None => default,
    }
}
