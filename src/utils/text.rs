//! 文本规范化与校验
//!
//! 页面标题在浏览器端取自 `document.title`，可能带有 HTML 实体；
//! 转发前解码为纯文本。

/// 邮箱校验错误
#[derive(Debug, PartialEq, Eq)]
pub enum EmailValidationError {
    Empty,
    Invalid(String),
}

impl std::fmt::Display for EmailValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "Email address cannot be empty"),
            Self::Invalid(addr) => write!(f, "Invalid email address: {}", addr),
        }
    }
}

impl std::error::Error for EmailValidationError {}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        "ndash" => Some('\u{2013}'),
        "mdash" => Some('\u{2014}'),
        "hellip" => Some('\u{2026}'),
        "laquo" => Some('\u{ab}'),
        "raquo" => Some('\u{bb}'),
        "copy" => Some('\u{a9}'),
        "reg" => Some('\u{ae}'),
        "trade" => Some('\u{2122}'),
        _ => {
            let numeric = entity.strip_prefix('#')?;
            let code = match numeric.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => numeric.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

/// Decodes named and numeric HTML entities; unknown entities are kept as-is.
pub fn decode_html_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        // 实体最长不超过 10 个字符
        let decoded = tail[1..]
            .char_indices()
            .take(10)
            .find(|(_, c)| *c == ';')
            .and_then(|(end, _)| decode_entity(&tail[1..=end]).map(|c| (c, end + 2)));

        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// 解码实体并去掉控制字符
pub fn normalize_page_title(title: &str) -> String {
    decode_html_entities(title)
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

/// 校验单个邮箱地址
pub fn validate_email(addr: &str) -> Result<(), EmailValidationError> {
    let addr = addr.trim();
    if addr.is_empty() {
        return Err(EmailValidationError::Empty);
    }

    let invalid = || EmailValidationError::Invalid(addr.to_string());
    let (local, domain) = addr.split_once('@').ok_or_else(invalid)?;

    let domain_ok = domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..")
        && domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    let local_ok = !local.is_empty()
        && local
            .chars()
            .all(|c| !c.is_whitespace() && !c.is_control() && c != '@');

    if domain_ok && local_ok {
        Ok(())
    } else {
        Err(invalid())
    }
}

/// 校验逗号分隔的邮箱列表，返回去空白后的地址
pub fn validate_email_list(list: &str) -> Result<Vec<String>, EmailValidationError> {
    let addrs: Vec<String> = list
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();

    if addrs.is_empty() {
        return Err(EmailValidationError::Empty);
    }
    for addr in &addrs {
        validate_email(addr)?;
    }
    Ok(addrs)
}
