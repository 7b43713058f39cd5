//! Sigma to Stellar field catalog
//!
//! Maps Sigma rule field names to Stellar query field paths, provides
//! human-readable display names for field paths, and maps Sigma match
//! modifiers to Stellar comparison operators.
//!
//! All lookups are pure and total: unknown fields pass through unchanged and
//! unknown modifiers fall back to `contains`.

use std::collections::HashMap;
use std::sync::LazyLock;

/// Sigma field name -> Stellar field path.
static SIGMA_TO_STELLAR_FIELDS: LazyLock<HashMap<&'static str, &'static str>> =
    LazyLock::new(|| {
        HashMap::from([
            ("CommandLine", "event_data.CommandLine"),
            ("Image", "event_data.Image"),
            ("ParentImage", "event_data.ParentImage"),
            ("ParentCommandLine", "event_data.ParentCommandLine"),
            ("ProcessId", "event_data.ProcessId"),
            ("ParentProcessId", "event_data.ParentProcessId"),
            ("TargetImage", "event_data.TargetImage"),
            ("GrantedAccess", "event_data.GrantedAccess"),
            ("CallTrace", "event_data.CallTrace"),
            ("TargetObject", "event_data.TargetObject"),
            ("Details", "event_data.Details"),
            ("EventType", "event_data.EventType"),
            ("PipeName", "event_data.PipeName"),
            ("DestinationHostname", "event_data.DestinationHostname"),
            ("Hashes", "event_data.Hashes"),
            ("Signature", "event_data.Signature"),
            ("ScriptBlockText", "event_data.ScriptBlockText"),
            ("RuleName", "event_data.RuleName"),
            ("User", "event_data.User"),
            ("LogonId", "event_data.LogonId"),
            ("EventID", "event_id"),
            ("ContextInfo", "event_data.ContextInfo"),
            ("Payload", "event_data.Payload"),
            ("ImageLoaded", "event_data.ImageLoaded"),
            ("OriginalFileName", "event_data.OriginalFileName"),
            ("SubjectUserSid", "event_data.SubjectUserSid"),
            ("LogonType", "event_data.LogonType"),
            ("LogonProcessName", "event_data.LogonProcessName"),
            ("KeyLength", "event_data.KeyLength"),
            ("TargetUserName", "event_data.TargetUserName"),
            ("ImagePath", "event_data.ImagePath"),
            ("SourceName", "event_data.SourceName"),
            ("Provider_Name", "source_name"),
            ("ServiceName", "event_data.ServiceName"),
            // IIS event log fields
            ("date", "event_data.date"),
            ("time", "event_data.time"),
            ("c-ip", "event_data.c-ip"),
            ("cs-username", "event_data.cs-username"),
            ("s-sitename", "event_data.s-sitename"),
            ("s-computername", "event_data.s-computername"),
            ("s-ip", "event_data.s-ip"),
            ("s-port", "event_data.s-port"),
            ("cs-method", "event_data.cs-method"),
            ("cs-uri-stem", "event_data.cs-uri-stem"),
            ("cs-uri-query", "event_data.cs-uri-query"),
            ("sc-status", "event_data.sc-status"),
            ("sc-substatus", "event_data.sc-substatus"),
            ("sc-win32-status", "event_data.sc-win32-status"),
            ("sc-bytes", "event_data.sc-bytes"),
            ("cs-bytes", "event_data.cs-bytes"),
            ("time-taken", "event_data.time-taken"),
            ("cs-version", "event_data.cs-version"),
            ("cs-host", "event_data.cs-host"),
            ("csUser-Agent", "event_data.csUser-Agent"),
            ("csCookie", "event_data.csCookie"),
            ("cs-referer", "event_data.csReferer"),
            ("csReferer", "event_data.csReferer"),
            ("EnabledFieldsFlags", "event_data.EnabledFieldsFlags"),
        ])
    });

/// Custom display names where the de-hyphenated default reads poorly
/// (mostly the IIS field family).
static CUSTOM_DISPLAY_NAMES: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("event_data.c-ip", "Client IP"),
        ("event_data.cs-username", "Client Username"),
        ("event_data.s-sitename", "Site Name"),
        ("event_data.s-computername", "Server Name"),
        ("event_data.s-ip", "Server IP"),
        ("event_data.s-port", "Server Port"),
        ("event_data.cs-method", "HTTP Method"),
        ("event_data.cs-uri-stem", "URI Path"),
        ("event_data.cs-uri-query", "Query String"),
        ("event_data.sc-status", "HTTP Status"),
        ("event_data.sc-substatus", "HTTP Substatus"),
        ("event_data.sc-win32-status", "Win32 Status"),
        ("event_data.sc-bytes", "Bytes Sent"),
        ("event_data.cs-bytes", "Bytes Received"),
        ("event_data.time-taken", "Time Taken (ms)"),
        ("event_data.cs-version", "HTTP Version"),
        ("event_data.cs-host", "Host Header"),
        ("event_data.csUser-Agent", "User Agent"),
        ("event_data.csCookie", "Cookie"),
        ("event_data.csReferer", "Referer"),
        ("event_data.date", "Date"),
        ("event_data.time", "Time"),
    ])
});

/// Stellar field path -> display name. Custom names win; otherwise the Sigma
/// field name is used (more readable than the full path).
static STELLAR_TO_DISPLAY_NAME: LazyLock<HashMap<&'static str, &'static str>> =
    LazyLock::new(|| {
        let mut map: HashMap<&'static str, &'static str> = SIGMA_TO_STELLAR_FIELDS
            .iter()
            .map(|(sigma, stellar)| (*stellar, *sigma))
            .collect();
        for (path, name) in CUSTOM_DISPLAY_NAMES.iter() {
            map.insert(path, name);
        }
        map
    });

/// Sigma match modifier -> Stellar comparison operator.
static SIGMA_OP_MAP: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("contains", "contains"),
        ("startswith", "starts with"),
        ("endswith", "ends with"),
        ("equals", "is"),
        ("is", "is"),
        ("all", "is"),
        ("in", "is in lookup"),
        ("not in", "is not in lookup"),
        ("matches", "matches"),
        ("re", "matches"),
        ("regex", "matches"),
        ("startswith~", "starts with"),
        ("endswith~", "ends with"),
        ("contains~", "contains"),
        ("cidr", "is in cidr"),
        ("not", "is not"),
        ("not contains", "is not contains"),
        ("exists", "exists"),
    ])
});

/// Resolve a Sigma field name to its Stellar field path.
/// Unknown fields are passed through unchanged.
pub fn lookup_field(name: &str) -> &str {
    SIGMA_TO_STELLAR_FIELDS
        .get(name)
        .copied()
        .unwrap_or(name)
}

/// Resolve a Sigma match modifier to a Stellar comparison operator.
/// Any unrecognized modifier falls back to `contains`.
pub fn operator_for(modifier: &str) -> &'static str {
    SIGMA_OP_MAP.get(modifier).copied().unwrap_or("contains")
}

/// Human-readable display name for a Stellar field path.
///
/// Order of preference: the custom/reverse table, then a de-hyphenated
/// title-cased rendering of the trailing `event_data.` segment, then the
/// path itself.
pub fn display_name(field_path: &str) -> String {
    if let Some(name) = STELLAR_TO_DISPLAY_NAME.get(field_path) {
        return (*name).to_string();
    }

    if let Some(field_name) = field_path.strip_prefix("event_data.") {
        if field_name.contains('-') {
            return field_name
                .split('-')
                .map(capitalize)
                .collect::<Vec<_>>()
                .join(" ");
        }
        return field_name.to_string();
    }

    field_path.to_string()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
