/// 公共验证函数模块
/// 提供答案归一化、难度等级、会话参数等输入验证，供引擎各操作共用。

/// Normalize a quiz answer for comparison: trim surrounding whitespace and
/// lowercase. Lowercasing is Unicode-aware so Swedish å/ä/ö compare
/// correctly against their uppercase forms.
pub fn normalize_answer(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Answer correctness: case-insensitive, whitespace-trimmed equality.
pub fn answers_match(user_answer: &str, correct_answer: &str) -> bool {
    normalize_answer(user_answer) == normalize_answer(correct_answer)
}

/// 难度等级必须在 1..=5 区间内
pub fn validate_difficulty_level(level: u8) -> Result<(), &'static str> {
    if !(1..=5).contains(&level) {
        return Err("difficulty level must be between 1 and 5");
    }
    Ok(())
}

/// A quiz needs at least one question.
pub fn validate_total_questions(total: u32) -> Result<(), &'static str> {
    if total == 0 {
        return Err("totalQuestions must be at least 1");
    }
    Ok(())
}

/// Elapsed quiz time must be a positive number of seconds. The upper bound
/// guards against callers submitting milliseconds where seconds are expected.
pub fn validate_time_spent_secs(secs: u32) -> Result<(), &'static str> {
    if secs == 0 {
        return Err("timeSpent must be a positive number of seconds");
    }
    if secs > 60 * 60 * 24 {
        return Err("timeSpent exceeds 24 hours");
    }
    Ok(())
}

/// Both sides of an answer comparison are required fields.
pub fn validate_answer_fields(user_answer: &str, correct_answer: &str) -> Result<(), &'static str> {
    if user_answer.trim().is_empty() {
        return Err("userAnswer is required");
    }
    if correct_answer.trim().is_empty() {
        return Err("correctAnswer is required");
    }
    Ok(())
}
