use tagstore::keys::{
    TagKeyError, all_tags_entry_key, all_tags_prefix, end_bound, hash_field_key, hash_prefix,
    job_info_key, parse_all_tags_entry_key, parse_hash_field_key, parse_job_info_key,
    parse_set_row_key, parse_tag_entry_key, scoped_tags_prefix, set_member_entry_key,
    set_member_prefix, set_row_key, tag_entry_key, tag_set_key,
};

#[test]
fn test_tag_entry_key_roundtrip() {
    let key = tag_entry_key("default", "job123", "urgent").unwrap();
    let parsed = parse_tag_entry_key(&key).unwrap();
    assert_eq!(parsed.scope, "default");
    assert_eq!(parsed.job_ref, "job123");
    assert_eq!(parsed.value, "urgent");
}

#[test]
fn test_all_tags_entry_key_roundtrip() {
    let key = all_tags_entry_key("urgent").unwrap();
    assert_eq!(key, "tags<urgent>");
    assert_eq!(parse_all_tags_entry_key(&key), Some("urgent"));
}

#[test]
fn test_reserved_delimiters_rejected() {
    for reserved in ["<", ">", ":"] {
        let value = format!("ur{reserved}gent");
        assert!(matches!(
            tag_entry_key("default", "job1", &value),
            Err(TagKeyError::ReservedCharacter(_, "tag value"))
        ));
        assert!(matches!(
            all_tags_entry_key(&value),
            Err(TagKeyError::ReservedCharacter(_, "tag value"))
        ));
        assert!(matches!(
            tag_set_key(&format!("sc{reserved}ope"), "job1"),
            Err(TagKeyError::ReservedCharacter(_, "scope"))
        ));
        assert!(matches!(
            tag_set_key("default", &format!("jo{reserved}b")),
            Err(TagKeyError::ReservedCharacter(_, "job reference"))
        ));
    }
}

#[test]
fn test_empty_segments_rejected() {
    assert!(matches!(
        tag_entry_key("default", "job1", ""),
        Err(TagKeyError::EmptySegment("tag value"))
    ));
    assert!(matches!(
        tag_set_key("", "job1"),
        Err(TagKeyError::EmptySegment("scope"))
    ));
    assert!(matches!(
        tag_set_key("default", ""),
        Err(TagKeyError::EmptySegment("job reference"))
    ));
}

#[test]
fn test_parse_rejects_malformed_keys() {
    // Wrong namespace
    assert!(parse_tag_entry_key("labels:default:job1<urgent>").is_none());
    // Missing trailing bracket
    assert!(parse_tag_entry_key("tags:default:job1<urgent").is_none());
    // No value brackets at all
    assert!(parse_tag_entry_key("tags:default:job1").is_none());
    // Too few segments
    assert!(parse_tag_entry_key("tags:job1<urgent>").is_none());
    // Too many segments
    assert!(parse_tag_entry_key("tags:a:b:c<urgent>").is_none());
    // Empty value
    assert!(parse_tag_entry_key("tags:default:job1<>").is_none());
    // Stray brackets inside the segments
    assert!(parse_tag_entry_key("tags:default:job1<a<b>").is_none());
    assert!(parse_tag_entry_key("tags:default:job1<a>b>").is_none());
    // The flat form is not a scoped entry
    assert!(parse_tag_entry_key("tags<urgent>").is_none());
}

#[test]
fn test_parse_all_tags_rejects_malformed_keys() {
    assert!(parse_all_tags_entry_key("tags:default:job1<urgent>").is_none());
    assert!(parse_all_tags_entry_key("tags<>").is_none());
    assert!(parse_all_tags_entry_key("tags<a<b>").is_none());
    assert!(parse_all_tags_entry_key("labels<urgent>").is_none());
    assert!(parse_all_tags_entry_key("tags<urgent").is_none());
}

#[test]
fn test_prefix_scanning() {
    let key1 = tag_entry_key("default", "job1", "urgent").unwrap();
    let key2 = tag_entry_key("default", "job2", "billing").unwrap();
    let scoped = scoped_tags_prefix(Some("default"));

    assert!(key1.starts_with(&scoped));
    assert!(key2.starts_with(&scoped));

    // A different scope should NOT match
    let key3 = tag_entry_key("archive", "job1", "urgent").unwrap();
    assert!(!key3.starts_with(&scoped));

    // The namespace-wide prefix matches both scopes
    let namespace = scoped_tags_prefix(None);
    assert!(key1.starts_with(&namespace));
    assert!(key3.starts_with(&namespace));

    // Flat index entries live outside the scoped prefix and vice versa
    let flat = all_tags_entry_key("urgent").unwrap();
    assert!(!flat.starts_with(&namespace));
    assert!(flat.starts_with(&all_tags_prefix()));
    assert!(!key1.starts_with(&all_tags_prefix()));
}

#[test]
fn test_end_bound_ordering() {
    let prefix = scoped_tags_prefix(Some("default"));
    let key = tag_entry_key("default", "job1", "urgent").unwrap();
    let end = end_bound(&prefix);

    assert!(prefix < key);
    assert!(key < end);
}

#[test]
fn test_set_member_entry_key_matches_tag_encoding() {
    let set_key = tag_set_key("default", "job1").unwrap();
    let via_set = set_member_entry_key(&set_key, "urgent");
    let direct = tag_entry_key("default", "job1", "urgent").unwrap();
    assert_eq!(via_set, direct);
    assert!(direct.starts_with(&set_member_prefix(&set_key)));
}

#[test]
fn test_physical_key_roundtrips() {
    let row = set_row_key("tags:default:job1<urgent>");
    assert_eq!(parse_set_row_key(&row), Some("tags:default:job1<urgent>"));

    let hash = hash_field_key("tags:default:job1", "created");
    assert_eq!(
        parse_hash_field_key(&hash),
        Some(("tags:default:job1", "created"))
    );
    assert!(hash.starts_with(&hash_prefix("tags:default:job1")));

    let job = job_info_key("job1");
    assert_eq!(parse_job_info_key(&job), Some("job1"));
}
