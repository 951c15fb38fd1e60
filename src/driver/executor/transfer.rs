use super::Executor;
use crate::driver::protocol::{CommandName, RequestBody, ResponseBody, TransferCommand, TransferRequest};
use crate::route::Route;

/// Transaction control: begin, commit and rollback
pub(crate) struct TransferExecutor {
    command: TransferCommand,
}

impl TransferExecutor {
    pub(crate) fn new(command: TransferCommand) -> Self {
        Self { command }
    }
}

impl Executor for TransferExecutor {
    type Output = ();

    fn verb(&self) -> &'static str {
        self.command.as_str()
    }

    fn table(&self) -> String {
        "transaction".to_string()
    }

    fn command(&self) -> CommandName {
        CommandName::Transfer
    }

    fn build_request(&self, route: &Route) -> RequestBody {
        RequestBody::TransferReq(TransferRequest {
            dbname: route.db_name.clone(),
            command: self.command,
        })
    }

    fn sql_text(&self) -> String {
        self.command.as_str().to_string()
    }

    fn map_response(&self, _route: &Route, body: ResponseBody) -> Option<()> {
        match body {
            ResponseBody::TransferResp(_) => Some(()),
            _ => None,
        }
    }
}
