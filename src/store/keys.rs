use chrono::NaiveDate;

use crate::store::StoreError;

/// Composite keys use `:` as the segment separator, so ids embedded in them
/// must not contain it. Empty ids would make prefixes collide across users.
fn require_plain_id(value: &str, field: &str) -> Result<(), StoreError> {
    if value.is_empty() {
        return Err(StoreError::Validation(format!("{field} must not be empty")));
    }
    if value.contains(':') {
        return Err(StoreError::Validation(format!(
            "{field} must not contain ':'"
        )));
    }
    Ok(())
}

pub fn user_key(user_id: &str) -> Result<String, StoreError> {
    require_plain_id(user_id, "userId")?;
    Ok(user_id.to_string())
}

pub fn word_key(word_id: &str) -> Result<String, StoreError> {
    require_plain_id(word_id, "wordId")?;
    Ok(word_id.to_string())
}

pub fn progress_key(user_id: &str, word_id: &str) -> Result<String, StoreError> {
    require_plain_id(user_id, "userId")?;
    require_plain_id(word_id, "wordId")?;
    Ok(format!("{user_id}:{word_id}"))
}

pub fn progress_prefix(user_id: &str) -> Result<String, StoreError> {
    require_plain_id(user_id, "userId")?;
    Ok(format!("{user_id}:"))
}

pub fn due_index_key(
    user_id: &str,
    due_ts_ms: i64,
    word_id: &str,
) -> Result<String, StoreError> {
    require_plain_id(user_id, "userId")?;
    require_plain_id(word_id, "wordId")?;
    let ts = due_ts_ms.max(0) as u64;
    Ok(format!("{user_id}:{ts:020}:{word_id}"))
}

pub fn due_index_prefix(user_id: &str) -> Result<String, StoreError> {
    require_plain_id(user_id, "userId")?;
    Ok(format!("{user_id}:"))
}

/// Parse `{user}:{ts:020}:{word}` back into (due timestamp, word id).
pub fn parse_due_index_item_key(key: &[u8]) -> Option<(i64, String)> {
    let text = std::str::from_utf8(key).ok()?;
    let mut parts = text.splitn(3, ':');
    let _user = parts.next()?;
    let ts = parts.next()?.parse::<i64>().ok()?;
    let word_id = parts.next()?;
    if word_id.is_empty() {
        return None;
    }
    Some((ts, word_id.to_string()))
}

pub fn quiz_session_key(session_id: &str) -> Result<String, StoreError> {
    require_plain_id(session_id, "sessionId")?;
    Ok(session_id.to_string())
}

pub fn quiz_session_user_index(user_id: &str, session_id: &str) -> Result<String, StoreError> {
    require_plain_id(user_id, "userId")?;
    require_plain_id(session_id, "sessionId")?;
    Ok(format!("user:{user_id}:{session_id}"))
}

pub fn quiz_session_user_prefix(user_id: &str) -> Result<String, StoreError> {
    require_plain_id(user_id, "userId")?;
    Ok(format!("user:{user_id}:"))
}

/// Answers are keyed by session plus a zero-padded sequence number so a
/// prefix scan returns them in the order they were asked.
pub fn quiz_answer_key(session_id: &str, seq: u32) -> Result<String, StoreError> {
    require_plain_id(session_id, "sessionId")?;
    Ok(format!("{session_id}:{seq:06}"))
}

pub fn quiz_answer_prefix(session_id: &str) -> Result<String, StoreError> {
    require_plain_id(session_id, "sessionId")?;
    Ok(format!("{session_id}:"))
}

pub fn streak_key(user_id: &str, date: NaiveDate) -> Result<String, StoreError> {
    require_plain_id(user_id, "userId")?;
    Ok(format!("{user_id}:{date}"))
}

pub fn streak_prefix(user_id: &str) -> Result<String, StoreError> {
    require_plain_id(user_id, "userId")?;
    Ok(format!("{user_id}:"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn due_index_orders_by_timestamp_asc() {
        let early = due_index_key("u1", 1_000, "w1").unwrap();
        let late = due_index_key("u1", 2_000, "w2").unwrap();
        assert!(early < late);
    }

    #[test]
    fn due_index_key_round_trips() {
        let key = due_index_key("u1", 123_456, "w9").unwrap();
        let (ts, word_id) = parse_due_index_item_key(key.as_bytes()).unwrap();
        assert_eq!(ts, 123_456);
        assert_eq!(word_id, "w9");
    }

    #[test]
    fn negative_timestamps_clamp_to_zero() {
        let key = due_index_key("u1", -5, "w1").unwrap();
        let (ts, _) = parse_due_index_item_key(key.as_bytes()).unwrap();
        assert_eq!(ts, 0);
    }

    #[test]
    fn ids_with_separator_rejected() {
        assert!(progress_key("u:1", "w1").is_err());
        assert!(progress_key("u1", "w:1").is_err());
        assert!(user_key("").is_err());
    }

    #[test]
    fn streak_key_uses_iso_date() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(streak_key("u1", date).unwrap(), "u1:2024-03-07");
    }

    #[test]
    fn answer_keys_order_by_sequence() {
        let first = quiz_answer_key("s1", 1).unwrap();
        let tenth = quiz_answer_key("s1", 10).unwrap();
        assert!(first < tenth);
    }
}
