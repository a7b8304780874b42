//! Pure field validators for the registration form.
//!
//! 規則沿用會員註冊的原始需求：台灣身分證字號（含檢查碼）、台灣手機
//! 號碼、滿 18 歲、固定長度數字 OTP。全部是不碰 I/O 的純函式。

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::registration::FormData;

/// 預設 OTP 長度
pub const OTP_CODE_LENGTH: usize = 6;
/// 註冊最低年齡
pub const MINIMUM_AGE: u32 = 18;

static TAIWAN_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z][12][0-9]{8}$").expect("valid regex"));
static TAIWAN_PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^09[0-9]{8}$").expect("valid regex"));

/// 縣市字母對應的兩位數代碼（身分證檢查碼用）
fn city_code(letter: char) -> Option<u32> {
    Some(match letter {
        'A' => 10,
        'B' => 11,
        'C' => 12,
        'D' => 13,
        'E' => 14,
        'F' => 15,
        'G' => 16,
        'H' => 17,
        'I' => 34,
        'J' => 18,
        'K' => 19,
        'L' => 20,
        'M' => 21,
        'N' => 22,
        'O' => 35,
        'P' => 23,
        'Q' => 24,
        'R' => 25,
        'S' => 26,
        'T' => 27,
        'U' => 28,
        'V' => 29,
        'W' => 32,
        'X' => 30,
        'Y' => 31,
        'Z' => 33,
        _ => return None,
    })
}

/// 台灣身分證字號：格式 + 檢查碼。
///
/// 檢查碼：字母代碼拆十位/個位加權 (×1, ×9)，第 2–9 碼依序加權
/// 8,7,…,1，檢查碼為 `(10 - sum mod 10) mod 10`。
pub fn is_valid_taiwan_id(id_number: &str) -> bool {
    if !TAIWAN_ID_RE.is_match(id_number) {
        return false;
    }

    let mut chars = id_number.chars();
    let letter = match chars.next() {
        Some(c) => c,
        None => return false,
    };
    let code = match city_code(letter) {
        Some(code) => code,
        None => return false,
    };

    let mut sum = (code / 10) + (code % 10) * 9;
    for (i, c) in id_number[1..9].chars().enumerate() {
        let digit = c.to_digit(10).unwrap_or(0);
        sum += digit * (8 - i as u32);
    }

    let expected = (10 - sum % 10) % 10;
    id_number[9..]
        .chars()
        .next()
        .and_then(|c| c.to_digit(10))
        .map(|check| check == expected)
        .unwrap_or(false)
}

/// 台灣手機號碼：09 開頭共 10 位數字。
pub fn is_valid_taiwan_phone(phone_number: &str) -> bool {
    TAIWAN_PHONE_RE.is_match(phone_number)
}

/// OTP：固定長度、全數字。
pub fn is_valid_otp_code(code: &str, length: usize) -> bool {
    code.len() == length && code.chars().all(|c| c.is_ascii_digit())
}

/// Age on `today`, with the month/day-precedence correction.
pub fn age_on(birth: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        age -= 1;
    }
    age
}

/// 生日欄位是否滿足最低年齡。不存在的日期（例如 2 月 30 日）直接不通過。
pub fn meets_minimum_age(
    year: &str,
    month: &str,
    day: &str,
    min_age: u32,
    today: NaiveDate,
) -> bool {
    let (Ok(year), Ok(month), Ok(day)) = (
        year.parse::<i32>(),
        month.parse::<u32>(),
        day.parse::<u32>(),
    ) else {
        return false;
    };
    match NaiveDate::from_ymd_opt(year, month, day) {
        Some(birth) => age_on(birth, today) >= min_age as i32,
        None => false,
    }
}

/// Field-level validation error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationCode {
    Required,
    TaiwanId,
    TaiwanPhone,
    MissingYear,
    MissingMonth,
    MissingDay,
    InvalidDate,
    MinimumAge,
    OtpCode,
}

/// A failed field, addressed by its flat path (`"address.city"` etc.).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub path: &'static str,
    pub code: ValidationCode,
}

impl FieldError {
    fn new(path: &'static str, code: ValidationCode) -> Self {
        Self { path, code }
    }
}

/// Validate the whole step-1 form, flattening nested groups into one
/// field-path → error-code list.
pub fn validate_form(form: &FormData, today: NaiveDate, min_age: u32) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if form.id_number.is_empty() {
        errors.push(FieldError::new("idNumber", ValidationCode::Required));
    } else if !is_valid_taiwan_id(&form.id_number) {
        errors.push(FieldError::new("idNumber", ValidationCode::TaiwanId));
    }

    if form.name.is_empty() {
        errors.push(FieldError::new("name", ValidationCode::Required));
    }

    let birth = &form.birth_date;
    if birth.year.is_empty() {
        errors.push(FieldError::new("birthDate.year", ValidationCode::MissingYear));
    }
    if birth.month.is_empty() {
        errors.push(FieldError::new(
            "birthDate.month",
            ValidationCode::MissingMonth,
        ));
    }
    if birth.day.is_empty() {
        errors.push(FieldError::new("birthDate.day", ValidationCode::MissingDay));
    }
    if birth.is_complete() {
        let parsed = (
            birth.year.parse::<i32>(),
            birth.month.parse::<u32>(),
            birth.day.parse::<u32>(),
        );
        match parsed {
            (Ok(y), Ok(m), Ok(d)) => match NaiveDate::from_ymd_opt(y, m, d) {
                Some(date) if age_on(date, today) >= min_age as i32 => {}
                Some(_) => errors.push(FieldError::new("birthDate", ValidationCode::MinimumAge)),
                None => errors.push(FieldError::new("birthDate", ValidationCode::InvalidDate)),
            },
            _ => errors.push(FieldError::new("birthDate", ValidationCode::InvalidDate)),
        }
    }

    if form.address.city.is_empty() {
        errors.push(FieldError::new("address.city", ValidationCode::Required));
    }
    if form.address.district.is_empty() {
        errors.push(FieldError::new("address.district", ValidationCode::Required));
    }
    if form.address.detail.is_empty() {
        errors.push(FieldError::new("address.detail", ValidationCode::Required));
    }

    if form.phone_number.is_empty() {
        errors.push(FieldError::new("phoneNumber", ValidationCode::Required));
    } else if !is_valid_taiwan_phone(&form.phone_number) {
        errors.push(FieldError::new("phoneNumber", ValidationCode::TaiwanPhone));
    }

    if form.email.is_empty() {
        errors.push(FieldError::new("email", ValidationCode::Required));
    }

    errors
}
