//! Property-based tests for command classification
//!
//! Classification is positional: only the first token and the two tokens
//! ending the line are inspected. These properties pin that down for
//! arbitrary text.

use parlor_proto::{CommandError, Intent, parse_command};
use proptest::prelude::*;

/// A single space-free token that is not a command keyword.
fn word() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9,.!?']{1,12}"
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Property: text without slash keywords is broadcast unchanged
    #[test]
    fn prop_plain_text_broadcasts_verbatim(words in prop::collection::vec(word(), 1..10)) {
        let line = words.join(" ");
        prop_assert_eq!(parse_command(&line), Ok(Intent::Broadcast(line.clone())));
    }

    /// Property: `<first> ... /to <n>` always addresses index n with the first token
    #[test]
    fn prop_trailing_to_addresses_index(
        words in prop::collection::vec(word(), 1..6),
        index in any::<u32>(),
    ) {
        let line = format!("{} /to {index}", words.join(" "));
        let expected = Intent::DirectTo { index: index as usize, payload: format!("{}\n\r", words[0]) };
        prop_assert_eq!(parse_command(&line), Ok(expected));
    }

    /// Property: `<first> ... /room <key>` always addresses the room by key
    #[test]
    fn prop_trailing_room_addresses_key(
        words in prop::collection::vec(word(), 1..6),
        key in word(),
    ) {
        let line = format!("{} /room {key}", words.join(" "));
        let expected = Intent::RoomBroadcast { room_key: key, payload: format!("{}\n\r", words[0]) };
        prop_assert_eq!(parse_command(&line), Ok(expected));
    }

    /// Property: a keyword followed by two or more tokens is plain text
    #[test]
    fn prop_mid_line_keyword_is_text(
        head in word(),
        keyword in prop::sample::select(vec!["/to", "/room"]),
        tail in prop::collection::vec(word(), 2..5),
    ) {
        let line = format!("{head} {keyword} {}", tail.join(" "));
        prop_assert_eq!(parse_command(&line), Ok(Intent::Broadcast(line.clone())));
    }

    /// Property: any non-numeric `/to` target is malformed, never a panic
    #[test]
    fn prop_non_numeric_index_is_malformed(head in word(), target in "[a-z]{1,8}") {
        let line = format!("{head} /to {target}");
        prop_assert_eq!(parse_command(&line), Err(CommandError::InvalidIndex(target)));
    }

    /// Property: every history id round-trips through the parser
    #[test]
    fn prop_history_id_parses(room_id in any::<u64>()) {
        let line = format!("/get_history {room_id}");
        prop_assert_eq!(parse_command(&line), Ok(Intent::FetchHistory(room_id)));
    }

    /// Property: parsing never panics on arbitrary input
    #[test]
    fn prop_parse_is_total(line in ".*") {
        let _ = parse_command(&line);
    }
}
