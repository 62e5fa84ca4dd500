//! 日誌相關工具函數
//!
//! 這個模組提供了日誌系統相關的工具函數。

/// 初始化日誌系統
///
/// `RUST_LOG` 優先於傳入的級別。重複初始化會被忽略。
///
/// # 參數
///
/// * `level` - 日誌級別
pub fn init_logger(level: &str) {
    let env = env_logger::Env::default()
        .filter_or("RUST_LOG", level);

    // 測試中可能被多次調用
    let _ = env_logger::Builder::from_env(env).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logger() {
        // 確保重複初始化不會崩潰
        init_logger("debug");
        init_logger("info");
    }
}
