use edge_auth::{generate_secret_base32, totp_code, totp_verify};

const SECRET: &str = "JBSWY3DPEHPK3PXP";

fn zero_pad(value: u32, digits: usize) -> String {
    format!("{value:0digits$}")
}

#[test]
fn verify_is_inverse_of_generate() {
    for (t, digits, period) in [(59u64, 6u32, 30u32), (1_111_111_109, 8, 30), (2_000_000_000, 6, 60)] {
        let code = totp_code(SECRET, t, digits, period).expect("code");
        let rendered = zero_pad(code, digits as usize);
        assert!(totp_verify(SECRET, &rendered, t, digits, period, 0));
    }
}

#[test]
fn code_off_by_one_period_needs_window() {
    let t = 1_700_000_000u64;
    let period = 30;
    let previous = totp_code(SECRET, t - u64::from(period), 6, period).expect("code");
    let rendered = zero_pad(previous, 6);
    assert!(!totp_verify(SECRET, &rendered, t, 6, period, 0));
    assert!(totp_verify(SECRET, &rendered, t, 6, period, 1));
}

#[test]
fn rejects_wrong_length_and_non_digits() {
    let t = 1_700_000_000u64;
    let code = totp_code(SECRET, t, 6, 30).expect("code");
    let rendered = zero_pad(code, 6);
    assert!(!totp_verify(SECRET, &rendered[1..], t, 6, 30, 0));
    assert!(!totp_verify(SECRET, "abcdef", t, 6, 30, 0));
}

#[test]
fn rejects_invalid_parameters() {
    assert!(!totp_verify(SECRET, "123456", 0, 5, 30, 0));
    assert!(!totp_verify(SECRET, "123456", 0, 11, 30, 0));
    assert!(!totp_verify(SECRET, "123456", 0, 6, 0, 0));
}

#[test]
fn generated_secret_is_base32_without_padding() {
    let secret = generate_secret_base32(20);
    assert!(!secret.contains('='));
    assert!(secret
        .chars()
        .all(|c| c.is_ascii_uppercase() || ('2'..='7').contains(&c)));
    // 最小长度下限：10 字节
    let short = generate_secret_base32(1);
    assert!(short.len() >= 16);
    // 两个密钥互不相同
    assert_ne!(generate_secret_base32(20), generate_secret_base32(20));
}

#[test]
fn window_saturates_near_epoch_start() {
    let code = totp_code(SECRET, 0, 6, 30).expect("code");
    let rendered = zero_pad(code, 6);
    // 时间下溢饱和到 0，不 panic
    assert!(totp_verify(SECRET, &rendered, 10, 6, 30, 3));
}
