use thiserror::Error;

/// Root namespace for all set entries that represent tag-to-job associations.
pub const TAG_ROOT: &str = "tags";

/// Characters that delimit the composite tag key format and therefore must
/// not appear inside any of its segments.
pub const RESERVED_DELIMITERS: [char; 3] = ['<', '>', ':'];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TagKeyError {
    #[error("reserved character {0:?} in {1}")]
    ReservedCharacter(char, &'static str),
    #[error("{0} must not be empty")]
    EmptySegment(&'static str),
}

fn check_segment(segment: &str, what: &'static str) -> Result<(), TagKeyError> {
    if segment.is_empty() {
        return Err(TagKeyError::EmptySegment(what));
    }
    if let Some(c) = segment.chars().find(|c| RESERVED_DELIMITERS.contains(c)) {
        return Err(TagKeyError::ReservedCharacter(c, what));
    }
    Ok(())
}

/// The logical set key holding one job's tag associations within a scope.
pub fn tag_set_key(scope: &str, job_ref: &str) -> Result<String, TagKeyError> {
    check_segment(scope, "scope")?;
    check_segment(job_ref, "job reference")?;
    Ok(format!("{TAG_ROOT}:{scope}:{job_ref}"))
}

/// Composite entry key for one (scope, job, tag) association.
pub fn tag_entry_key(scope: &str, job_ref: &str, value: &str) -> Result<String, TagKeyError> {
    let set_key = tag_set_key(scope, job_ref)?;
    check_segment(value, "tag value")?;
    Ok(format!("{set_key}<{value}>"))
}

/// Entry key in the flat all-tags index, one row per distinct tag value.
pub fn all_tags_entry_key(value: &str) -> Result<String, TagKeyError> {
    check_segment(value, "tag value")?;
    Ok(format!("{TAG_ROOT}<{value}>"))
}

/// A scoped tag entry key, decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTagEntry {
    pub scope: String,
    pub job_ref: String,
    pub value: String,
}

/// Decode a composite tag entry key. Keys that do not match the expected
/// shape yield `None`; callers skip them.
pub fn parse_tag_entry_key(key: &str) -> Option<ParsedTagEntry> {
    let head = key.strip_suffix('>')?;
    let (head, value) = head.rsplit_once('<')?;
    if value.is_empty() || value.contains('>') {
        return None;
    }
    let mut parts = head.split(':');
    let namespace = parts.next()?;
    let scope = parts.next()?;
    let job_ref = parts.next()?;
    if parts.next().is_some() || namespace != TAG_ROOT || scope.is_empty() || job_ref.is_empty() {
        return None;
    }
    // Leftover angle brackets mean the key never came from the encoder
    if scope.contains(['<', '>']) || job_ref.contains(['<', '>']) {
        return None;
    }
    Some(ParsedTagEntry {
        scope: scope.to_string(),
        job_ref: job_ref.to_string(),
        value: value.to_string(),
    })
}

/// Decode an entry key of the flat all-tags index, returning the tag value.
pub fn parse_all_tags_entry_key(key: &str) -> Option<&str> {
    let value = key
        .strip_prefix(TAG_ROOT)?
        .strip_prefix('<')?
        .strip_suffix('>')?;
    if value.is_empty() || value.contains('<') || value.contains('>') {
        return None;
    }
    Some(value)
}

/// Search prefix covering every entry in the flat all-tags index.
pub fn all_tags_prefix() -> String {
    format!("{TAG_ROOT}<")
}

/// Search prefix covering scoped tag entries: all of them, or only those
/// under one scope.
pub fn scoped_tags_prefix(scope: Option<&str>) -> String {
    match scope {
        Some(scope) => format!("{TAG_ROOT}:{scope}:"),
        None => format!("{TAG_ROOT}:"),
    }
}

/// Composite entry key for a member of a generic set.
pub fn set_member_entry_key(set_key: &str, value: &str) -> String {
    format!("{set_key}<{value}>")
}

/// Prefix shared by every member entry of one set.
pub fn set_member_prefix(set_key: &str) -> String {
    format!("{set_key}<")
}

/// The KV store key for a set entry row.
pub fn set_row_key(entry_key: &str) -> String {
    format!("sets/{entry_key}")
}

/// The KV store prefix for set entry rows whose entry key starts with the
/// given logical prefix.
pub fn sets_prefix(entry_key_prefix: &str) -> String {
    format!("sets/{entry_key_prefix}")
}

/// The KV store key for one field of a companion hash.
pub fn hash_field_key(hash_key: &str, field: &str) -> String {
    format!("hashes/{hash_key}/{field}")
}

/// The KV store prefix covering every field of one companion hash.
pub fn hash_prefix(hash_key: &str) -> String {
    format!("hashes/{hash_key}/")
}

/// The KV store key for a job record by id.
pub fn job_info_key(id: &str) -> String {
    format!("jobs/{id}")
}

/// Extract the logical entry key from a set row key.
pub fn parse_set_row_key(key: &str) -> Option<&str> {
    key.strip_prefix("sets/")
}

/// Extract (hash key, field) from a hash row key.
pub fn parse_hash_field_key(key: &str) -> Option<(&str, &str)> {
    key.strip_prefix("hashes/")?.rsplit_once('/')
}

/// Extract the job id from a job record key.
pub fn parse_job_info_key(key: &str) -> Option<&str> {
    key.strip_prefix("jobs/")
}

/// Exclusive upper bound for a range scan over all keys starting with
/// `prefix`. Valid because stored keys never contain `char::MAX`.
pub fn end_bound(prefix: &str) -> String {
    format!("{prefix}{}", char::MAX)
}
