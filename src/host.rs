//! SSH hosts.
//!
//! Hosts come from a plain text file, one per line. A regex picks the host out of
//! each line (its first capture group) and every host is normalized to
//! `host:port` before it is handed to the pool.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};

use colored::*;
use colourado::Color;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::HostListError;

/// Default regex: everything up to the last word boundary of the line.
pub const DEFAULT_HOST_PATTERN: &str = r"^(.*)\b";

/// Reads hosts from any reader. Lines the regex does not match are skipped,
/// and so are lines that are not valid UTF-8.
pub fn parse_host_list<R: Read>(
    reader: R,
    pattern: &Regex,
    port: &str,
) -> Result<Vec<String>, HostListError> {
    let mut hosts = vec![];
    for (number, line) in BufReader::new(reader).split(b'\n').enumerate() {
        let line = line?;
        let line = line.strip_suffix(b"\r").unwrap_or(&line[..]);
        let line = match std::str::from_utf8(line) {
            Ok(line) => line,
            Err(_) => {
                warn!(line = number + 1, "skipping host list line with invalid UTF-8");
                continue;
            }
        };
        if let Some(host) = pattern.captures(line).and_then(|c| c.get(1)) {
            hosts.push(with_port(host.as_str(), port));
        }
    }
    Ok(hosts)
}

pub fn read_host_list(path: &str, pattern: &Regex, port: &str) -> Result<Vec<String>, HostListError> {
    let file = File::open(path).map_err(|source| HostListError::Open {
        path: path.to_string(),
        source,
    })?;
    let hosts = parse_host_list(file, pattern, port)?;
    debug!(count = hosts.len(), path, "hosts detected");
    Ok(hosts)
}

/// Appends `:port` unless the host already ends in a numeric port.
///
/// An empty host stays empty and a trailing `:` gets the port filled in. A bare
/// IPv6 address (more than one `:`) has no port and is bracketed first.
pub fn with_port(host: &str, port: &str) -> String {
    if host.is_empty() {
        return String::new();
    }
    if host.matches(':').count() > 1 && !host.starts_with('[') && !host.contains("://") {
        return format!("[{}]:{}", host, port);
    }
    if host.starts_with('[') && host.ends_with(']') {
        return format!("{}:{}", host, port);
    }
    match host.rsplit_once(':') {
        Some((_, "")) => format!("{}{}", host, port),
        Some((_, last)) if last.bytes().all(|b| b.is_ascii_digit()) => host.to_string(),
        _ => format!("{}:{}", host, port),
    }
}

/// For pretty-printing the host name.
/// Surrounds with brackets and colors it with the given color.
pub fn prettify(host: &str, color: Color) -> ColoredString {
    let r = (color.red * 255.0) as u8;
    let g = (color.green * 255.0) as u8;
    let b = (color.blue * 255.0) as u8;
    format!("[{}]", host).truecolor(r, g, b)
}
