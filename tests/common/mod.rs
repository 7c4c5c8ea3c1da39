#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use tempfile::TempDir;

use progress_engine::config::LimitsConfig;
use progress_engine::store::operations::users::UserAccount;
use progress_engine::store::operations::words::WordEntry;
use progress_engine::store::Store;
use progress_engine::Engine;

pub fn test_engine() -> (TempDir, Engine) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(
        Store::open(dir.path().join("test.sled").to_str().expect("utf8 path")).expect("open store"),
    );
    (dir, Engine::new(LimitsConfig::default(), store))
}

pub fn seed_user(engine: &Engine, id: &str) -> UserAccount {
    let user = UserAccount::new(id, &format!("user-{id}"));
    engine.store().create_user(&user).expect("create user");
    user
}

pub fn seed_word(engine: &Engine, id: &str, swedish: &str, english: &str) -> WordEntry {
    let word = WordEntry {
        id: id.to_string(),
        swedish: swedish.to_string(),
        english: english.to_string(),
        word_type: "noun".to_string(),
        difficulty_level: 2,
        created_at: Utc::now(),
    };
    engine.store().upsert_word(&word).expect("upsert word");
    word
}

/// Seed `count` words with generated ids w0..w{count-1}.
pub fn seed_words(engine: &Engine, count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            let id = format!("w{i}");
            seed_word(engine, &id, &format!("ord{i}"), &format!("word{i}"));
            id
        })
        .collect()
}
