use serde::{Deserialize, Serialize};

use super::types::TransferCommand;

/// RPC selected by a request envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandName {
    Transfer,
    OriSelect,
    OriInsert,
    OriDelete,
    OriUpdate,
}

impl CommandName {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandName::Transfer => "transfer",
            CommandName::OriSelect => "ori_select",
            CommandName::OriInsert => "ori_insert",
            CommandName::OriDelete => "ori_delete",
            CommandName::OriUpdate => "ori_update",
        }
    }
}

impl std::fmt::Display for CommandName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request envelope sent as the body of a query packet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Diagnostic id, `<db>.<table>.<verb>.<seq>`
    pub logid: String,
    pub command: CommandName,
    /// Shard key
    pub bigid: u64,
    #[serde(default)]
    pub request_offline_mysql: bool,
    #[serde(default)]
    pub need_sql_info: bool,
    pub req: RequestBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestBody {
    TransferReq(TransferRequest),
    OriSelectReq(SelectRequest),
    OriInsertReq(InsertRequest),
    OriDeleteReq(DeleteRequest),
    OriUpdateReq(UpdateRequest),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub dbname: String,
    pub command: TransferCommand,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectRequest {
    pub dbname: String,
    pub table: String,
    pub columns: String,
    /// WHERE expression, followed by group by / having on the offline replica
    pub complex_filter: String,
    #[serde(default)]
    pub orderby: String,
    #[serde(default)]
    pub limit: String,
    #[serde(default)]
    pub forupdate: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertRequest {
    pub dbname: String,
    pub table: String,
    pub columns: String,
    /// Value tuples without the outer parentheses
    pub values: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub dbname: String,
    pub table: String,
    pub complex_filter: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub dbname: String,
    pub table: String,
    /// Assignment list, `a = 1, b = 'x'`
    pub set: String,
    #[serde(default)]
    pub complex_filter: String,
}

impl Request {
    pub fn new(logid: String, command: CommandName, bigid: u64, req: RequestBody) -> Self {
        Self {
            logid,
            command,
            bigid,
            request_offline_mysql: false,
            need_sql_info: true,
            req,
        }
    }

    pub fn offline(mut self, offline: bool) -> Self {
        self.request_offline_mysql = offline;
        self
    }
}
