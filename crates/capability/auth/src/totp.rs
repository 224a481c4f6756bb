//! TOTP（RFC 6238）/ HOTP-SHA1（RFC 4226）。
//!
//! 密钥为无填充的 Base32（RFC 4648）；验证码渲染为 digits 位零填充十进制，
//! 比较走常量时间路径。

use hmac::{Hmac, Mac};
use rand_core::{OsRng, RngCore};
use sha1::Sha1;
use subtle::ConstantTimeEq;

type HmacSha1 = Hmac<Sha1>;

/// TOTP 计算错误。
#[derive(Debug, thiserror::Error)]
pub enum TotpError {
    #[error("digits out of range")]
    DigitsOutOfRange,
    #[error("period must be > 0")]
    PeriodOutOfRange,
    #[error("empty totp key")]
    EmptyKey,
    #[error("bad base32 secret")]
    BadSecret,
    #[error("hmac error: {0}")]
    Hmac(String),
}

/// 生成 Base32（无填充）随机密钥。最少 10 字节（80 位）。
pub fn generate_secret_base32(bytes: usize) -> String {
    let bytes = bytes.max(10);
    let mut raw = vec![0u8; bytes];
    OsRng.fill_bytes(&mut raw);
    base32::encode(base32::Alphabet::Rfc4648 { padding: false }, &raw)
}

/// 计算时刻 `unix_time` 的验证码：HOTP-SHA1(counter = unix_time / period) mod 10^digits。
pub fn totp_code(
    secret_base32: &str,
    unix_time: u64,
    digits: u32,
    period: u32,
) -> Result<u32, TotpError> {
    if !(6..=10).contains(&digits) {
        return Err(TotpError::DigitsOutOfRange);
    }
    if period == 0 {
        return Err(TotpError::PeriodOutOfRange);
    }

    let key = decode_base32_key(secret_base32)?;
    if key.is_empty() {
        return Err(TotpError::EmptyKey);
    }

    let counter = unix_time / u64::from(period);
    let message = counter.to_be_bytes();

    let mut mac =
        HmacSha1::new_from_slice(&key).map_err(|err| TotpError::Hmac(err.to_string()))?;
    mac.update(&message);
    let digest = mac.finalize().into_bytes();

    // RFC 4226 动态截断：offset + 4 ≤ digest.len()
    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    if offset + 4 > digest.len() {
        return Err(TotpError::Hmac("truncation offset out of range".to_string()));
    }
    let binary = (u32::from(digest[offset] & 0x7f) << 24)
        | (u32::from(digest[offset + 1]) << 16)
        | (u32::from(digest[offset + 2]) << 8)
        | u32::from(digest[offset + 3]);

    Ok(binary % 10u32.pow(digits))
}

/// 校验输入验证码。窗口内逐个 counter 比较，比较为常量时间。
///
/// 输入先过滤为纯数字；位数不符直接失败。时间平移在 0 与 u64::MAX 处饱和。
pub fn totp_verify(
    secret_base32: &str,
    code: &str,
    unix_time: u64,
    digits: u32,
    period: u32,
    window: u32,
) -> bool {
    if !(6..=10).contains(&digits) || period == 0 {
        return false;
    }
    let cleaned: String = code.chars().filter(|c| c.is_ascii_digit()).collect();
    if cleaned.len() != digits as usize {
        return false;
    }

    let window = i64::from(window);
    for shift in -window..=window {
        let delta = shift.saturating_mul(i64::from(period));
        let t = clamp_shifted_time(unix_time, delta);
        let Ok(expected) = totp_code(secret_base32, t, digits, period) else {
            return false;
        };
        let expected = zero_pad(expected, digits as usize);
        if expected.len() == cleaned.len()
            && bool::from(expected.as_bytes().ct_eq(cleaned.as_bytes()))
        {
            return true;
        }
    }
    false
}

fn clamp_shifted_time(unix_time: u64, delta_seconds: i64) -> u64 {
    if delta_seconds < 0 {
        let sub = delta_seconds.unsigned_abs();
        unix_time.saturating_sub(sub)
    } else {
        unix_time.saturating_add(delta_seconds as u64)
    }
}

fn zero_pad(value: u32, digits: usize) -> String {
    format!("{value:0digits$}")
}

fn decode_base32_key(secret_base32: &str) -> Result<Vec<u8>, TotpError> {
    // 容忍空白与连字符（常见的密钥展示格式）
    let cleaned: String = secret_base32
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '\t' | '\r' | '\n'))
        .collect();
    base32::decode(base32::Alphabet::Rfc4648 { padding: false }, &cleaned)
        .ok_or(TotpError::BadSecret)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_pad_keeps_width() {
        assert_eq!(zero_pad(7, 6), "000007");
        assert_eq!(zero_pad(123456, 6), "123456");
    }

    #[test]
    fn shifted_time_saturates_at_zero() {
        assert_eq!(clamp_shifted_time(10, -30), 0);
        assert_eq!(clamp_shifted_time(100, -30), 70);
        assert_eq!(clamp_shifted_time(u64::MAX, 30), u64::MAX);
    }
}
