//! IPC facade: unmarshals plugin requests and forwards them to [`Cooperate`].
//!
//! Request parameters arrive as `bincode`-encoded parameter structs.  Every
//! entry point returns an `i32` status from the `RET_OK`/`RET_ERR` family and
//! may write reply bytes.

use std::sync::Arc;

use async_trait::async_trait;
use coop_core::NetworkId;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::application::cooperate::Cooperate;
use crate::application::error::{status_of, CooperateError, RET_ERR, RET_OK};

/// Identity of the IPC caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallingContext {
    pub token_id: u64,
    pub pid: i32,
    pub uid: i32,
}

/// Ids accepted by `add_watch`, `remove_watch` and `get_param`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CooperateRequestId {
    RegisterListener = 0,
    UnregisterListener = 1,
    RegisterHotAreaListener = 2,
    UnregisterHotAreaListener = 3,
    RegisterEventListener = 4,
    UnregisterEventListener = 5,
    GetCooperateState = 6,
}

impl TryFrom<u32> for CooperateRequestId {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => CooperateRequestId::RegisterListener,
            1 => CooperateRequestId::UnregisterListener,
            2 => CooperateRequestId::RegisterHotAreaListener,
            3 => CooperateRequestId::UnregisterHotAreaListener,
            4 => CooperateRequestId::RegisterEventListener,
            5 => CooperateRequestId::UnregisterEventListener,
            6 => CooperateRequestId::GetCooperateState,
            other => return Err(other),
        })
    }
}

// ── Parameters ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultParam {
    pub user_data: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartCooperateParam {
    pub user_data: i32,
    pub remote_network_id: String,
    pub start_device_id: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopCooperateParam {
    pub user_data: i32,
    pub is_unchained: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetCooperateStateParam {
    pub user_data: i32,
    pub network_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MouseLocationParam {
    pub network_id: String,
}

/// Reply of `GET_COOPERATE_STATE`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BooleanReply {
    pub state: bool,
}

fn unmarshal<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, CooperateError> {
    bincode::deserialize(data).map_err(|e| {
        error!("{} unmarshalling failed: {e}", std::any::type_name::<T>());
        CooperateError::InvalidParam(e.to_string())
    })
}

/// Encodes a parameter or reply struct.
pub fn marshal<T: Serialize>(value: &T) -> Result<Vec<u8>, CooperateError> {
    bincode::serialize(value).map_err(|e| CooperateError::InvalidParam(e.to_string()))
}

// ── The plugin contract ──────────────────────────────────────────────────────

/// The plugin surface the IPC dispatcher calls into.
#[async_trait]
pub trait IPlugin: Send + Sync {
    async fn enable(&self, ctx: &CallingContext, data: &[u8], reply: &mut Vec<u8>) -> i32;
    async fn disable(&self, ctx: &CallingContext, data: &[u8], reply: &mut Vec<u8>) -> i32;
    async fn start(&self, ctx: &CallingContext, data: &[u8], reply: &mut Vec<u8>) -> i32;
    async fn stop(&self, ctx: &CallingContext, data: &[u8], reply: &mut Vec<u8>) -> i32;
    async fn add_watch(&self, ctx: &CallingContext, id: u32, data: &[u8], reply: &mut Vec<u8>)
        -> i32;
    async fn remove_watch(
        &self,
        ctx: &CallingContext,
        id: u32,
        data: &[u8],
        reply: &mut Vec<u8>,
    ) -> i32;
    async fn set_param(&self, ctx: &CallingContext, id: u32, data: &[u8], reply: &mut Vec<u8>)
        -> i32;
    async fn get_param(&self, ctx: &CallingContext, id: u32, data: &[u8], reply: &mut Vec<u8>)
        -> i32;
    async fn control(&self, ctx: &CallingContext, id: u32, data: &[u8], reply: &mut Vec<u8>)
        -> i32;
}

pub struct CooperateServer {
    cooperate: Arc<Cooperate>,
}

impl CooperateServer {
    pub fn new(cooperate: Arc<Cooperate>) -> Self {
        Self { cooperate }
    }

    fn watch(&self, ctx: &CallingContext, id: u32, data: &[u8], add: bool) -> Result<(), CooperateError> {
        let request = CooperateRequestId::try_from(id).map_err(|id| {
            error!("unexpected request id {id}");
            CooperateError::InvalidParam(format!("request id {id}"))
        })?;
        let pid = ctx.pid;
        let cooperate = &self.cooperate;
        match (request, add) {
            (CooperateRequestId::RegisterListener, true) => cooperate.register_listener(pid),
            (CooperateRequestId::UnregisterListener, false) => cooperate.unregister_listener(pid),
            (CooperateRequestId::RegisterHotAreaListener, true) => {
                cooperate.register_hot_area_listener(pid)
            }
            (CooperateRequestId::UnregisterHotAreaListener, false) => {
                cooperate.unregister_hot_area_listener(pid)
            }
            (CooperateRequestId::RegisterEventListener, true) => {
                let param: MouseLocationParam = unmarshal(data)?;
                cooperate.register_event_listener(pid, NetworkId::from(param.network_id))
            }
            (CooperateRequestId::UnregisterEventListener, false) => {
                let param: MouseLocationParam = unmarshal(data)?;
                cooperate.unregister_event_listener(pid, NetworkId::from(param.network_id))
            }
            (other, _) => {
                error!("request {other:?} not valid for this call");
                Err(CooperateError::InvalidParam(format!("{other:?}")))
            }
        }
    }
}

#[async_trait]
impl IPlugin for CooperateServer {
    /// `RET_OK` means the request was queued.  If the service then fails to
    /// come up the caller receives `Unprepare` with the error code.
    async fn enable(&self, ctx: &CallingContext, data: &[u8], _reply: &mut Vec<u8>) -> i32 {
        let result = unmarshal::<DefaultParam>(data)
            .and_then(|param| self.cooperate.enable(ctx.pid, param.user_data));
        status_of(&result)
    }

    async fn disable(&self, ctx: &CallingContext, data: &[u8], _reply: &mut Vec<u8>) -> i32 {
        let result = unmarshal::<DefaultParam>(data)
            .and_then(|param| self.cooperate.disable(ctx.pid, param.user_data));
        status_of(&result)
    }

    async fn start(&self, ctx: &CallingContext, data: &[u8], _reply: &mut Vec<u8>) -> i32 {
        let param: StartCooperateParam = match unmarshal(data) {
            Ok(param) => param,
            Err(_) => return RET_ERR,
        };
        debug!("start from pid {} to device {}", ctx.pid, param.start_device_id);
        let result = self
            .cooperate
            .start(
                ctx.pid,
                param.user_data,
                NetworkId::from(param.remote_network_id),
                param.start_device_id,
            )
            .await;
        status_of(&result)
    }

    async fn stop(&self, ctx: &CallingContext, data: &[u8], _reply: &mut Vec<u8>) -> i32 {
        let param: StopCooperateParam = match unmarshal(data) {
            Ok(param) => param,
            Err(_) => return RET_ERR,
        };
        let result = self
            .cooperate
            .stop(ctx.pid, param.user_data, param.is_unchained)
            .await;
        status_of(&result)
    }

    async fn add_watch(
        &self,
        ctx: &CallingContext,
        id: u32,
        data: &[u8],
        _reply: &mut Vec<u8>,
    ) -> i32 {
        status_of(&self.watch(ctx, id, data, true))
    }

    async fn remove_watch(
        &self,
        ctx: &CallingContext,
        id: u32,
        data: &[u8],
        _reply: &mut Vec<u8>,
    ) -> i32 {
        status_of(&self.watch(ctx, id, data, false))
    }

    async fn set_param(
        &self,
        _ctx: &CallingContext,
        _id: u32,
        _data: &[u8],
        _reply: &mut Vec<u8>,
    ) -> i32 {
        RET_ERR
    }

    async fn get_param(
        &self,
        ctx: &CallingContext,
        id: u32,
        data: &[u8],
        reply: &mut Vec<u8>,
    ) -> i32 {
        if CooperateRequestId::try_from(id) != Ok(CooperateRequestId::GetCooperateState) {
            error!("unexpected request id {id}");
            return RET_ERR;
        }
        let param: GetCooperateStateParam = match unmarshal(data) {
            Ok(param) => param,
            Err(_) => return RET_ERR,
        };
        let state = match self
            .cooperate
            .get_cooperate_state(ctx.pid, param.user_data, NetworkId::from(param.network_id))
            .await
        {
            Ok(state) => state,
            Err(e) => return e.code(),
        };
        match marshal(&BooleanReply { state }) {
            Ok(bytes) => {
                *reply = bytes;
                RET_OK
            }
            Err(_) => RET_ERR,
        }
    }

    async fn control(
        &self,
        _ctx: &CallingContext,
        _id: u32,
        _data: &[u8],
        _reply: &mut Vec<u8>,
    ) -> i32 {
        RET_ERR
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::context::ContextOptions;
    use crate::infrastructure::mock::MockCollaborators;

    fn server(mocks: &MockCollaborators) -> CooperateServer {
        let cooperate =
            Cooperate::new(mocks.collaborators(), ContextOptions::default()).expect("worker");
        CooperateServer::new(Arc::new(cooperate))
    }

    fn caller() -> CallingContext {
        CallingContext {
            token_id: 1,
            pid: 42,
            uid: 1000,
        }
    }

    #[tokio::test]
    async fn test_enable_with_valid_param_returns_ret_ok() {
        let mocks = MockCollaborators::new("local-a");
        let server = server(&mocks);
        let data = marshal(&DefaultParam { user_data: 3 }).expect("marshal");
        assert_eq!(server.enable(&caller(), &data, &mut Vec::new()).await, RET_OK);
    }

    #[tokio::test]
    async fn test_garbage_params_return_ret_err() {
        // Arrange
        let mocks = MockCollaborators::new("local-a");
        let server = server(&mocks);
        let garbage = [0xffu8];

        // Act / Assert
        assert_eq!(server.enable(&caller(), &garbage, &mut Vec::new()).await, RET_ERR);
        assert_eq!(server.start(&caller(), &garbage, &mut Vec::new()).await, RET_ERR);
        assert_eq!(server.stop(&caller(), &garbage, &mut Vec::new()).await, RET_ERR);
    }

    #[tokio::test]
    async fn test_set_param_and_control_are_unsupported() {
        let mocks = MockCollaborators::new("local-a");
        let server = server(&mocks);
        assert_eq!(server.set_param(&caller(), 0, &[], &mut Vec::new()).await, RET_ERR);
        assert_eq!(server.control(&caller(), 0, &[], &mut Vec::new()).await, RET_ERR);
    }

    #[tokio::test]
    async fn test_watch_ids_are_checked_against_the_call() {
        // Arrange
        let mocks = MockCollaborators::new("local-a");
        let server = server(&mocks);
        let register = CooperateRequestId::RegisterListener as u32;
        let unregister = CooperateRequestId::UnregisterListener as u32;

        // Act / Assert
        assert_eq!(server.add_watch(&caller(), register, &[], &mut Vec::new()).await, RET_OK);
        assert_eq!(server.add_watch(&caller(), unregister, &[], &mut Vec::new()).await, RET_ERR);
        assert_eq!(server.remove_watch(&caller(), unregister, &[], &mut Vec::new()).await, RET_OK);
        assert_eq!(server.add_watch(&caller(), 99, &[], &mut Vec::new()).await, RET_ERR);
    }

    #[tokio::test]
    async fn test_get_param_writes_boolean_reply() {
        // Arrange
        let mocks = MockCollaborators::new("local-a");
        mocks.profiles.set_switch("peer-b", false);
        let server = server(&mocks);
        let data = marshal(&GetCooperateStateParam {
            user_data: 1,
            network_id: "peer-b".into(),
        })
        .expect("marshal");
        let mut reply = Vec::new();

        // Act
        let status = server
            .get_param(&caller(), CooperateRequestId::GetCooperateState as u32, &data, &mut reply)
            .await;

        // Assert
        assert_eq!(status, RET_OK);
        let decoded: BooleanReply = bincode::deserialize(&reply).expect("reply");
        assert!(!decoded.state);
    }

    #[tokio::test]
    async fn test_start_without_enable_reports_error_status() {
        let mocks = MockCollaborators::new("local-a");
        let server = server(&mocks);
        let data = marshal(&StartCooperateParam {
            user_data: 1,
            remote_network_id: "peer-b".into(),
            start_device_id: 1,
        })
        .expect("marshal");
        assert_eq!(server.start(&caller(), &data, &mut Vec::new()).await, RET_ERR);
    }
}
