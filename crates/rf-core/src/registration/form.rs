use serde::{Deserialize, Serialize};

/// 生日（年/月/日都是字串，與表單下拉選單對齊）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BirthDate {
    pub year: String,
    pub month: String,
    pub day: String,
}

impl BirthDate {
    pub fn is_complete(&self) -> bool {
        !self.year.is_empty() && !self.month.is_empty() && !self.day.is_empty()
    }
}

/// 地址（縣市 / 鄉鎮區 / 詳細地址）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Address {
    pub city: String,
    pub district: String,
    pub detail: String,
}

impl Address {
    pub fn is_complete(&self) -> bool {
        !self.city.is_empty() && !self.district.is_empty() && !self.detail.is_empty()
    }
}

/// Registration form data, persisted as camelCase JSON under the
/// `registrationData` slot.
///
/// Every field defaults so that a partially written snapshot (for example
/// one missing `email`) still deserializes; completeness is decided by
/// [`FormData::is_complete`], not by parse failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormData {
    /// 身分證字號
    pub id_number: String,
    /// 姓名
    pub name: String,
    /// 生日
    pub birth_date: BirthDate,
    /// 地址
    pub address: Address,
    /// 手機號碼
    pub phone_number: String,
    /// 電子信箱
    pub email: String,

    pub step1_completed: bool,
    /// ISO-8601 completion timestamp, set by the store
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step1_completed_at: Option<String>,

    /// OTP 驗證碼（步驟 2 完成時寫入）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp_code: Option<String>,

    pub step2_completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step2_completed_at: Option<String>,
}

impl FormData {
    /// Completeness predicate used for step validation: all top-level
    /// required fields plus both nested groups must be non-empty.
    pub fn is_complete(&self) -> bool {
        !self.id_number.is_empty()
            && !self.name.is_empty()
            && !self.phone_number.is_empty()
            && !self.email.is_empty()
            && self.birth_date.is_complete()
            && self.address.is_complete()
    }
}

/// Partial update for [`FormData`].
///
/// Mirrors the form data with every field optional; merging replaces
/// present fields wholesale (nested groups included), leaving the rest
/// untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormDataPatch {
    pub id_number: Option<String>,
    pub name: Option<String>,
    pub birth_date: Option<BirthDate>,
    pub address: Option<Address>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
    pub step1_completed: Option<bool>,
    pub step1_completed_at: Option<String>,
    pub otp_code: Option<String>,
    pub step2_completed: Option<bool>,
    pub step2_completed_at: Option<String>,
}

impl FormDataPatch {
    /// Merge this patch into `form`, field by field.
    pub fn apply(self, form: &mut FormData) {
        if let Some(v) = self.id_number {
            form.id_number = v;
        }
        if let Some(v) = self.name {
            form.name = v;
        }
        if let Some(v) = self.birth_date {
            form.birth_date = v;
        }
        if let Some(v) = self.address {
            form.address = v;
        }
        if let Some(v) = self.phone_number {
            form.phone_number = v;
        }
        if let Some(v) = self.email {
            form.email = v;
        }
        if let Some(v) = self.step1_completed {
            form.step1_completed = v;
        }
        if let Some(v) = self.step1_completed_at {
            form.step1_completed_at = Some(v);
        }
        if let Some(v) = self.otp_code {
            form.otp_code = Some(v);
        }
        if let Some(v) = self.step2_completed {
            form.step2_completed = v;
        }
        if let Some(v) = self.step2_completed_at {
            form.step2_completed_at = Some(v);
        }
    }
}

impl From<FormData> for FormDataPatch {
    fn from(form: FormData) -> Self {
        Self {
            id_number: Some(form.id_number),
            name: Some(form.name),
            birth_date: Some(form.birth_date),
            address: Some(form.address),
            phone_number: Some(form.phone_number),
            email: Some(form.email),
            step1_completed: Some(form.step1_completed),
            step1_completed_at: form.step1_completed_at,
            otp_code: form.otp_code,
            step2_completed: Some(form.step2_completed),
            step2_completed_at: form.step2_completed_at,
        }
    }
}
