use serde::{Deserialize, Serialize};

use super::types::StoreRecord;
use crate::error::{SqlInfo, RC_SUCCESS};

/// Response envelope carried by a reply packet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Result code, `RC_SUCCESS` on success
    #[serde(default)]
    pub error: i32,
    #[serde(default)]
    pub err_msg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_info: Option<SqlInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resp: Option<ResponseBody>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseBody {
    TransferResp(TransferResponse),
    SelectResp(SelectResponse),
    InsertResp(InsertResponse),
    DeleteResp(AffectedResponse),
    UpdateResp(AffectedResponse),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResponse {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectResponse {
    #[serde(default)]
    pub records: Vec<StoreRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertResponse {
    #[serde(default)]
    pub affect_rows: u64,
    #[serde(default)]
    pub last_insertid: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffectedResponse {
    #[serde(default)]
    pub affect_rows: u64,
}

impl Response {
    /// Create a success response with a payload
    pub fn ok(body: ResponseBody) -> Self {
        Self {
            error: RC_SUCCESS,
            resp: Some(body),
            ..Default::default()
        }
    }

    /// Create a failure response
    pub fn error(code: i32, message: impl Into<String>, sql_info: Option<SqlInfo>) -> Self {
        Self {
            error: code,
            err_msg: message.into(),
            sql_info,
            resp: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error == RC_SUCCESS
    }
}
