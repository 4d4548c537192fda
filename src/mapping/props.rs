//! mapping::props
//!
//! Property names and value grammars shared by all schemes.
//!
//! Every format here is read and written by other clients too, so the
//! byte layout is fixed: line endings are `\n`, path escaping is
//! percent-encoding with upper-case hex digits, and timestamps use the
//! nanosecond `YYYY-MM-DD HH:MM:SS.fffffffff +HHMM` form.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::debug;

use crate::core::errors::BridgeError;
use crate::core::types::{FileId, RevisionId};
use crate::core::Result;
use crate::target::Revision;

pub const PROP_PREFIX: &str = "bzr:";
pub const PROP_ANCESTRY: &str = "bzr:ancestry:";
pub const PROP_FILEIDS: &str = "bzr:file-ids";
pub const PROP_MERGE: &str = "bzr:merge";
pub const PROP_REVISION_INFO: &str = "bzr:revision-info";
pub const PROP_REVISION_ID: &str = "bzr:revision-id:";
pub const PROP_TEXT_PARENTS: &str = "bzr:text-parents";
pub const PROP_LOG: &str = "bzr:log";
pub const PROP_HIDDEN: &str = "bzr:hidden";
pub const PROP_REQUIRED_FEATURES: &str = "bzr:required-features";

pub const REVPROP_COMMITTER: &str = "bzr:committer";
pub const REVPROP_FILEIDS: &str = "bzr:file-ids";
pub const REVPROP_MAPPING_VERSION: &str = "bzr:mapping-version";
pub const REVPROP_MERGE: &str = "bzr:merge";
pub const REVPROP_REVISION_ID: &str = "bzr:revision-id";
pub const REVPROP_REVNO: &str = "bzr:revno";
pub const REVPROP_REVPROP_PREFIX: &str = "bzr:revprop:";
pub const REVPROP_ROOT: &str = "bzr:root";
pub const REVPROP_TIMESTAMP: &str = "bzr:timestamp";
pub const REVPROP_LOG: &str = "bzr:log";
pub const REVPROP_TEXT_PARENTS: &str = "bzr:text-parents";
pub const REVPROP_REQUIRED_FEATURES: &str = "bzr:required-features";
pub const REVPROP_BASE_REVISION: &str = "bzr:base-revision";
pub const REVPROP_HIDDEN: &str = "bzr:hidden";
pub const REVPROP_SKIP: &str = "bzr:skip";

pub const SVN_AUTHOR: &str = "svn:author";
pub const SVN_DATE: &str = "svn:date";
pub const SVN_LOG: &str = "svn:log";
pub const SVN_EXECUTABLE: &str = "svn:executable";
pub const SVN_SPECIAL: &str = "svn:special";

/// Features this crate understands in `bzr:required-features`.
pub const SUPPORTED_FEATURES: &[&str] = &[];

fn percent_encode(s: &str, keep: impl Fn(u8) -> bool) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        if keep(b) {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

/// Escape everything except `[A-Za-z0-9_.~-]`.
pub fn escape_svn_path(s: &str) -> String {
    percent_encode(s, |b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'~' | b'-'))
}

/// Escape everything except `[A-Za-z0-9_.~]`.
///
/// Used where `-` separates fields.
pub fn escape_strict(s: &str) -> String {
    percent_encode(s, |b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'~'))
}

/// Escape only what cannot appear in a colon-separated revision id.
pub fn escape_minimal(s: &str) -> String {
    percent_encode(s, |b| b.is_ascii_graphic() && b != b'%' && b != b':')
}

/// Undo any of the escapes above.
pub fn unescape(s: &str, property: &str) -> Result<String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = s
                .get(i + 1..i + 3)
                .ok_or_else(|| BridgeError::malformed(property, format!("truncated escape in '{s}'")))?;
            let b = u8::from_str_radix(hex, 16)
                .map_err(|_| BridgeError::malformed(property, format!("bad escape '%{hex}'")))?;
            out.push(b);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| BridgeError::malformed(property, "escaped text is not UTF-8"))
}

/// Format a timestamp with nanosecond precision and a numeric offset.
///
/// ```
/// use svnbridge::mapping::props::format_highres_date;
///
/// assert_eq!(
///     format_highres_date(1234567890.5, 3600),
///     "2009-02-14 00:31:30.500000000 +0100"
/// );
/// ```
pub fn format_highres_date(timestamp: f64, offset: i32) -> String {
    let floor = timestamp.floor();
    let mut secs = floor as i64;
    let mut nanos = ((timestamp - floor) * 1e9).round() as u32;
    if nanos >= 1_000_000_000 {
        secs += 1;
        nanos -= 1_000_000_000;
    }
    let local = DateTime::<Utc>::from_timestamp(secs + i64::from(offset), 0)
        .unwrap_or_default()
        .format("%Y-%m-%d %H:%M:%S");
    let sign = if offset < 0 { '-' } else { '+' };
    let abs = offset.unsigned_abs();
    format!(
        "{local}.{nanos:09} {sign}{:02}{:02}",
        abs / 3600,
        (abs / 60) % 60
    )
}

/// Parse a [`format_highres_date`] string into `(timestamp, offset)`.
pub fn unpack_highres_date(date: &str, property: &str) -> Result<(f64, i32)> {
    let bad = |reason: &str| BridgeError::malformed(property, format!("{reason}: '{date}'"));
    let mut date = date.trim();
    if !date.starts_with(|c: char| c.is_ascii_digit()) {
        // leading day name
        date = date.split_once(' ').ok_or_else(|| bad("no valid date"))?.1;
    }
    let dot = date
        .find('.')
        .ok_or_else(|| bad("missing high-precision seconds"))?;
    let base = NaiveDateTime::parse_from_str(&date[..dot], "%Y-%m-%d %H:%M:%S")
        .map_err(|_| bad("bad date"))?;
    let (fraction, offset) = date[dot..]
        .split_once(' ')
        .ok_or_else(|| bad("missing offset"))?;
    let fraction: f64 = format!("0{fraction}").parse().map_err(|_| bad("bad fraction"))?;
    let offset = offset.trim();
    let (negative, digits) = match offset.as_bytes().first() {
        Some(b'-') => (true, &offset[1..]),
        Some(b'+') => (false, &offset[1..]),
        _ => (false, offset),
    };
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad("bad offset"));
    }
    let hours: i32 = digits[..2].parse().map_err(|_| bad("bad offset"))?;
    let minutes: i32 = digits[2..].parse().map_err(|_| bad("bad offset"))?;
    let mut seconds_offset = hours * 3600 + minutes * 60;
    if negative {
        seconds_offset = -seconds_offset;
    }
    let timestamp = base.and_utc().timestamp() - i64::from(seconds_offset);
    Ok((timestamp as f64 + fraction, seconds_offset))
}

/// Parse an `svn:date` value (`2009-02-13T23:31:30.000000Z`).
pub fn parse_svn_date(date: &str) -> Result<f64> {
    let parsed = DateTime::parse_from_rfc3339(date.trim())
        .map_err(|e| BridgeError::malformed(SVN_DATE, format!("'{date}': {e}")))?;
    Ok(parsed.timestamp() as f64 + f64::from(parsed.timestamp_subsec_nanos()) / 1e9)
}

/// Format seconds since the epoch as an `svn:date` value.
pub fn format_svn_date(timestamp: f64) -> String {
    let secs = timestamp.floor();
    let nanos = ((timestamp - secs) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::<Utc>::from_timestamp(secs as i64, nanos)
        .unwrap_or_default()
        .format("%Y-%m-%dT%H:%M:%S%.6fZ")
        .to_string()
}

/// Fill committer, message and timestamp from native revision properties.
pub fn parse_svn_revprops(revprops: &BTreeMap<String, String>, rev: &mut Revision) -> Result<()> {
    rev.committer = revprops.get(SVN_AUTHOR).cloned().unwrap_or_default();
    rev.message = revprops.get(SVN_LOG).cloned().unwrap_or_default();
    rev.timestamp = match revprops.get(SVN_DATE) {
        Some(date) => parse_svn_date(date)?,
        None => 0.0,
    };
    rev.timezone = 0;
    rev.properties.clear();
    Ok(())
}

/// Text of a `bzr:revision-info` property.
pub fn generate_revision_metadata(
    timestamp: Option<f64>,
    timezone: i32,
    committer: Option<&str>,
    properties: &BTreeMap<String, String>,
) -> String {
    let mut text = String::new();
    if let Some(timestamp) = timestamp {
        text.push_str(&format!(
            "timestamp: {}\n",
            format_highres_date(timestamp, timezone)
        ));
    }
    if let Some(committer) = committer {
        text.push_str(&format!("committer: {committer}\n"));
    }
    if !properties.is_empty() {
        text.push_str("properties: \n");
        for (key, value) in properties {
            text.push_str(&format!("\t{key}: {value}\n"));
        }
    }
    text
}

/// Apply a `bzr:revision-info` property to `rev`.
pub fn parse_revision_metadata(text: &str, rev: &mut Revision) -> Result<()> {
    let mut in_properties = false;
    for line in text.lines() {
        let (key, value) = line
            .split_once(": ")
            .or_else(|| line.strip_suffix(':').map(|k| (k, "")))
            .ok_or_else(|| {
                BridgeError::malformed(PROP_REVISION_INFO, "missing ': ' in revision metadata")
            })?;
        match key {
            "committer" => rev.committer = value.to_string(),
            "timestamp" => {
                let (timestamp, timezone) = unpack_highres_date(value, PROP_REVISION_INFO)?;
                rev.timestamp = timestamp;
                rev.timezone = timezone;
            }
            "properties" => in_properties = true,
            _ => match key.strip_prefix('\t') {
                Some(name) if in_properties => {
                    rev.properties.insert(name.to_string(), value.to_string());
                }
                _ => {
                    return Err(BridgeError::malformed(
                        PROP_REVISION_INFO,
                        format!("invalid key '{key}'"),
                    ))
                }
            },
        }
    }
    Ok(())
}

/// Apply the `bzr:*` revision properties to `rev`.
pub fn parse_bzr_revprops(revprops: &BTreeMap<String, String>, rev: &mut Revision) -> Result<()> {
    if let Some(ts) = revprops.get(REVPROP_TIMESTAMP) {
        let (timestamp, timezone) = unpack_highres_date(ts, REVPROP_TIMESTAMP)?;
        rev.timestamp = timestamp;
        rev.timezone = timezone;
    }
    if let Some(committer) = revprops.get(REVPROP_COMMITTER) {
        rev.committer = committer.clone();
    }
    if let Some(log) = revprops.get(REVPROP_LOG) {
        rev.message = log.clone();
    }
    for (name, value) in revprops {
        if let Some(key) = name.strip_prefix(REVPROP_REVPROP_PREFIX) {
            rev.properties.insert(key.to_string(), value.clone());
        }
    }
    Ok(())
}

/// One `<revno> <revid>` line of a `bzr:revision-id:<name>` property.
pub fn parse_revid_line(line: &str) -> Result<(u64, RevisionId)> {
    let property = PROP_REVISION_ID;
    if line.contains('\n') {
        return Err(BridgeError::malformed(property, "newline in revision id line"));
    }
    let (revno, revid) = line
        .split_once(' ')
        .ok_or_else(|| BridgeError::malformed(property, "missing space"))?;
    let revno: u64 = revno
        .parse()
        .map_err(|_| BridgeError::malformed(property, format!("revno '{revno}' is not a number")))?;
    if revid.is_empty() {
        return Err(BridgeError::malformed(property, "empty revision id"));
    }
    let revid = RevisionId::new(revid)
        .map_err(|e| BridgeError::malformed(property, e.to_string()))?;
    Ok((revno, revid))
}

pub fn generate_revid_line(revno: u64, revid: &RevisionId) -> String {
    format!("{revno} {revid}\n")
}

/// The current (last) entry of a revision-id property, if any.
pub fn last_revid_line(text: &str) -> Result<Option<(u64, RevisionId)>> {
    match text.lines().last() {
        Some(line) => parse_revid_line(line).map(Some),
        None => Ok(None),
    }
}

/// Parse one line of a merge property. Lines with spaces are skipped.
pub fn parse_merge_line(line: &str) -> Vec<RevisionId> {
    if line.contains(' ') {
        debug!(line, "invalid revision id in merge property, skipping");
        return Vec::new();
    }
    line.split('\t')
        .filter(|s| !s.is_empty())
        .filter_map(|s| RevisionId::new(s).ok())
        .collect()
}

fn parse_path_map<V>(
    text: &str,
    property: &str,
    value: impl Fn(&str) -> Result<V>,
) -> Result<BTreeMap<String, V>> {
    let mut map = BTreeMap::new();
    for line in text.lines() {
        let (path, v) = line
            .split_once('\t')
            .ok_or_else(|| BridgeError::malformed(property, "missing tab separator"))?;
        map.insert(unescape(path, property)?, value(v)?);
    }
    Ok(map)
}

fn generate_path_map<V: std::fmt::Display>(map: &BTreeMap<String, V>) -> String {
    map.iter()
        .map(|(path, v)| format!("{}\t{}\n", escape_svn_path(path), v))
        .collect()
}

/// Parse `bzr:file-ids`.
pub fn parse_fileid_property(text: &str) -> Result<BTreeMap<String, FileId>> {
    parse_path_map(text, PROP_FILEIDS, |v| {
        FileId::new(v).map_err(|e| BridgeError::malformed(PROP_FILEIDS, e.to_string()))
    })
}

pub fn generate_fileid_property(map: &BTreeMap<String, FileId>) -> String {
    generate_path_map(map)
}

/// Parse `bzr:text-parents`.
pub fn parse_text_parents_property(text: &str) -> Result<BTreeMap<String, RevisionId>> {
    parse_path_map(text, PROP_TEXT_PARENTS, |v| {
        RevisionId::new(v).map_err(|e| BridgeError::malformed(PROP_TEXT_PARENTS, e.to_string()))
    })
}

pub fn generate_text_parents_property(map: &BTreeMap<String, RevisionId>) -> String {
    generate_path_map(map)
}

/// Parse a comma-separated `bzr:required-features` value.
pub fn parse_required_features(text: &str) -> BTreeSet<String> {
    text.split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect()
}

/// Refuse revisions that need features this crate lacks.
pub fn check_required_features(text: &str) -> Result<()> {
    let missing: Vec<String> = parse_required_features(text)
        .into_iter()
        .filter(|f| !SUPPORTED_FEATURES.contains(&f.as_str()))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(BridgeError::unsupported(format!(
            "revision requires features: {}",
            missing.join(", ")
        )))
    }
}
