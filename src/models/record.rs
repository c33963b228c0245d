//! 门户返回数据与考生成绩记录

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// 门户接口在成功时返回的状态值
pub const SUCCESS_STATE: &str = "success";
/// 门户接口在学号不存在时返回的消息
pub const NO_RECORD_MESSAGE: &str = "No record found";

/// 考生成绩记录（对外输出）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub roll_number: String,
    pub name: String,
    pub course: String,
    pub stream: String,
    pub social_category: String,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub barcode_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entrance_roll_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
}

/// 提交后页面渲染的结果表格（一行）
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResultTableRow {
    pub barcode_number: String,
    pub entrance_roll_number: String,
    pub applicant_name: String,
    pub entrance_score: String,
    pub course: String,
    pub stream: String,
    pub social_category: String,
    pub remarks: String,
}

/// 门户接口返回的考生字段
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ApplicantPayload {
    #[serde(rename = "vchApplicantName")]
    pub applicant_name: Option<String>,
    #[serde(rename = "vchCourse")]
    pub course: Option<String>,
    #[serde(rename = "vchStream")]
    pub stream: Option<String>,
    #[serde(rename = "vchSocialCategory")]
    pub social_category: Option<String>,
    #[serde(rename = "vchPreference")]
    pub preference: Option<JsonValue>,
}

/// 门户查询接口的响应体
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PortalResponse {
    pub state: Option<String>,
    pub message: Option<String>,
    pub data: Option<JsonValue>,
}

/// 对门户响应的判定
#[derive(Debug, Clone, PartialEq)]
pub enum PortalVerdict {
    /// 查询成功，附带考生字段
    Found(ApplicantPayload),
    /// 学号不存在（终态，不再重试）
    NoRecord,
    /// 其余情况一律视为验证码被拒绝
    CaptchaRejected,
}

impl PortalResponse {
    pub fn from_json(value: JsonValue) -> Self {
        serde_json::from_value(value).unwrap_or_default()
    }

    /// 判定响应类型
    ///
    /// 任何既不是成功、也不是"No record found"的响应都按验证码错误处理，
    /// 包括门户将来可能新增的响应形态（例如会话过期）。
    pub fn verdict(&self) -> PortalVerdict {
        if self.state.as_deref() == Some(SUCCESS_STATE) {
            let applicant = self
                .data
                .clone()
                .and_then(|d| serde_json::from_value(d).ok())
                .unwrap_or_default();
            PortalVerdict::Found(applicant)
        } else if self.message.as_deref() == Some(NO_RECORD_MESSAGE) {
            PortalVerdict::NoRecord
        } else {
            PortalVerdict::CaptchaRejected
        }
    }
}

impl StudentRecord {
    /// 合并表格与接口数据
    ///
    /// 每个字段优先取表格中的值（与人工查询所见一致），为空时回退到接口字段。
    pub fn from_sources(
        roll_number: &str,
        api: &ApplicantPayload,
        table: Option<&ResultTableRow>,
    ) -> Self {
        let score_text = non_blank(table.map(|t| t.entrance_score.as_str())).or_else(|| {
            api.preference.as_ref().map(|v| match v {
                JsonValue::String(s) => s.clone(),
                other => other.to_string(),
            })
        });

        Self {
            roll_number: roll_number.to_string(),
            name: non_blank(table.map(|t| t.applicant_name.as_str()))
                .or_else(|| api.applicant_name.clone())
                .unwrap_or_default(),
            course: non_blank(table.map(|t| t.course.as_str()))
                .or_else(|| api.course.clone())
                .unwrap_or_default(),
            stream: non_blank(table.map(|t| t.stream.as_str()))
                .or_else(|| api.stream.clone())
                .unwrap_or_default(),
            social_category: non_blank(table.map(|t| t.social_category.as_str()))
                .or_else(|| api.social_category.clone())
                .unwrap_or_default(),
            score: score_text.as_deref().map(parse_score).unwrap_or(0.0),
            barcode_number: non_blank(table.map(|t| t.barcode_number.as_str())),
            entrance_roll_number: non_blank(table.map(|t| t.entrance_roll_number.as_str()))
                .or_else(|| Some(roll_number.to_string())),
            remarks: non_blank(table.map(|t| t.remarks.as_str())),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// 解析分数（取开头的数值部分，失败为 0）
fn parse_score(text: &str) -> f64 {
    let text = text.trim();
    let numeric: String = text
        .char_indices()
        .take_while(|(i, c)| {
            c.is_ascii_digit() || *c == '.' || (*i == 0 && (*c == '-' || *c == '+'))
        })
        .map(|(_, c)| c)
        .collect();
    numeric.parse().unwrap_or(0.0)
}
