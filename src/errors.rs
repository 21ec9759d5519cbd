use std::fmt;

/// Failure kinds of the crypto envelope, kept distinct so each cause can be
/// logged on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncryptionError {
    KeyLoad(String),
    JsonEncode(String),
    AesEncrypt(String),
    RsaEncrypt(String),
}

impl EncryptionError {
    pub fn kind(&self) -> &'static str {
        match self {
            EncryptionError::KeyLoad(_) => "key load",
            EncryptionError::JsonEncode(_) => "json encode",
            EncryptionError::AesEncrypt(_) => "aes encrypt",
            EncryptionError::RsaEncrypt(_) => "rsa encrypt",
        }
    }

    pub fn cause(&self) -> &str {
        match self {
            EncryptionError::KeyLoad(msg)
            | EncryptionError::JsonEncode(msg)
            | EncryptionError::AesEncrypt(msg)
            | EncryptionError::RsaEncrypt(msg) => msg,
        }
    }
}

impl fmt::Display for EncryptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.kind(), self.cause())
    }
}

impl std::error::Error for EncryptionError {}

#[derive(Debug, Clone)]
pub enum TrackerError {
    Encryption(EncryptionError),
    Transport(String),
    Application(String),
    Validation(String),
    NotFound(String),
    DatabaseConfig(String),
    DatabaseConnection(String),
    DatabaseOperation(String),
    Serialization(String),
    Config(String),
    FileOperation(String),
}

impl TrackerError {
    /// 获取错误代码
    pub fn code(&self) -> &'static str {
        match self {
            TrackerError::Encryption(_) => "E001",
            TrackerError::Transport(_) => "E002",
            TrackerError::Application(_) => "E003",
            TrackerError::Validation(_) => "E004",
            TrackerError::NotFound(_) => "E005",
            TrackerError::DatabaseConfig(_) => "E006",
            TrackerError::DatabaseConnection(_) => "E007",
            TrackerError::DatabaseOperation(_) => "E008",
            TrackerError::Serialization(_) => "E009",
            TrackerError::Config(_) => "E010",
            TrackerError::FileOperation(_) => "E011",
        }
    }

    /// 获取错误类型名称
    pub fn error_type(&self) -> &'static str {
        match self {
            TrackerError::Encryption(_) => "Encryption Error",
            TrackerError::Transport(_) => "Transport Error",
            TrackerError::Application(_) => "Application Error",
            TrackerError::Validation(_) => "Validation Error",
            TrackerError::NotFound(_) => "Resource Not Found",
            TrackerError::DatabaseConfig(_) => "Database Configuration Error",
            TrackerError::DatabaseConnection(_) => "Database Connection Error",
            TrackerError::DatabaseOperation(_) => "Database Operation Error",
            TrackerError::Serialization(_) => "Serialization Error",
            TrackerError::Config(_) => "Configuration Error",
            TrackerError::FileOperation(_) => "File Operation Error",
        }
    }

    /// 获取错误详情
    pub fn message(&self) -> String {
        match self {
            TrackerError::Encryption(err) => err.to_string(),
            TrackerError::Transport(msg)
            | TrackerError::Application(msg)
            | TrackerError::Validation(msg)
            | TrackerError::NotFound(msg)
            | TrackerError::DatabaseConfig(msg)
            | TrackerError::DatabaseConnection(msg)
            | TrackerError::DatabaseOperation(msg)
            | TrackerError::Serialization(msg)
            | TrackerError::Config(msg)
            | TrackerError::FileOperation(msg) => msg.clone(),
        }
    }

    /// 格式化为彩色输出（用于启动失败时的终端输出）
    pub fn format_colored(&self) -> String {
        use colored::Colorize;
        format!(
            "{} {} {}\n  {}",
            "[ERROR]".red().bold(),
            self.code().yellow(),
            self.error_type().red(),
            self.message().white()
        )
    }

    /// 格式化为简洁输出
    pub fn format_simple(&self) -> String {
        format!("{}: {}", self.error_type(), self.message())
    }
}

impl fmt::Display for TrackerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_simple())
    }
}

impl std::error::Error for TrackerError {}

// 便捷的构造函数
impl TrackerError {
    pub fn transport<T: Into<String>>(msg: T) -> Self {
        TrackerError::Transport(msg.into())
    }

    pub fn application<T: Into<String>>(msg: T) -> Self {
        TrackerError::Application(msg.into())
    }

    pub fn validation<T: Into<String>>(msg: T) -> Self {
        TrackerError::Validation(msg.into())
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        TrackerError::NotFound(msg.into())
    }

    pub fn database_config<T: Into<String>>(msg: T) -> Self {
        TrackerError::DatabaseConfig(msg.into())
    }

    pub fn database_connection<T: Into<String>>(msg: T) -> Self {
        TrackerError::DatabaseConnection(msg.into())
    }

    pub fn database_operation<T: Into<String>>(msg: T) -> Self {
        TrackerError::DatabaseOperation(msg.into())
    }

    pub fn serialization<T: Into<String>>(msg: T) -> Self {
        TrackerError::Serialization(msg.into())
    }

    pub fn config<T: Into<String>>(msg: T) -> Self {
        TrackerError::Config(msg.into())
    }

    pub fn file_operation<T: Into<String>>(msg: T) -> Self {
        TrackerError::FileOperation(msg.into())
    }

    /// 是否为远程调用失败（传输层或应用层）
    pub fn is_remote_failure(&self) -> bool {
        matches!(
            self,
            TrackerError::Transport(_) | TrackerError::Application(_)
        )
    }
}

impl From<EncryptionError> for TrackerError {
    fn from(err: EncryptionError) -> Self {
        TrackerError::Encryption(err)
    }
}

// 为常见的错误类型实现 From trait
impl From<sea_orm::DbErr> for TrackerError {
    fn from(err: sea_orm::DbErr) -> Self {
        TrackerError::DatabaseOperation(err.to_string())
    }
}

impl From<std::io::Error> for TrackerError {
    fn from(err: std::io::Error) -> Self {
        TrackerError::FileOperation(err.to_string())
    }
}

impl From<serde_json::Error> for TrackerError {
    fn from(err: serde_json::Error) -> Self {
        TrackerError::Serialization(err.to_string())
    }
}

impl From<chrono::ParseError> for TrackerError {
    fn from(err: chrono::ParseError) -> Self {
        TrackerError::Validation(format!("invalid date: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, TrackerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_unique() {
        let errors = [
            TrackerError::Encryption(EncryptionError::KeyLoad("x".into())),
            TrackerError::transport("x"),
            TrackerError::application("x"),
            TrackerError::validation("x"),
            TrackerError::not_found("x"),
            TrackerError::database_config("x"),
            TrackerError::database_connection("x"),
            TrackerError::database_operation("x"),
            TrackerError::serialization("x"),
            TrackerError::config("x"),
            TrackerError::file_operation("x"),
        ];
        let mut codes: Vec<_> = errors.iter().map(|e| e.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_encryption_kinds_are_distinguishable() {
        let key = EncryptionError::KeyLoad("bad pem".into());
        let rsa = EncryptionError::RsaEncrypt("too long".into());
        assert_ne!(key.kind(), rsa.kind());
        assert_eq!(key.to_string(), "key load failed: bad pem");

        let wrapped: TrackerError = rsa.into();
        assert_eq!(wrapped.code(), "E001");
        assert!(wrapped.format_simple().contains("rsa encrypt"));
    }

    #[test]
    fn test_remote_failure_classification() {
        assert!(TrackerError::transport("timeout").is_remote_failure());
        assert!(TrackerError::application("Unknown error").is_remote_failure());
        assert!(!TrackerError::validation("bad").is_remote_failure());
    }
}
