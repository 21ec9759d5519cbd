pub mod ip;
pub mod text;

/// Client-side date format (`MM-DD-YYYY`, visitor local time).
pub const CLIENT_DATE_FORMAT: &str = "%m-%d-%Y";

pub fn generate_random_code(length: usize) -> String {
    random_from_alphabet(
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789",
        length,
    )
}

/// 小写字母 + 数字
pub fn generate_lowercase_code(length: usize) -> String {
    random_from_alphabet(b"abcdefghijklmnopqrstuvwxyz0123456789", length)
}

fn random_from_alphabet(chars: &[u8], length: usize) -> String {
    std::iter::repeat_with(|| chars[rand::random_range(0..chars.len())] as char)
        .take(length)
        .collect()
}
