//! Level Control cluster (0x0008).

use std::sync::Arc;

use zigflow_core::types::Id;

use crate::device::Result;
use crate::zcl::attribute::{Access, AttributeDescriptor, DataType};
use crate::zcl::codec::ZclWriter;
use crate::zcl::command::CommandPayload;
use crate::zcl::global::ReportingConfiguration;
use crate::zcl::proxy::{AttributeChange, ClusterDescriptor, ClusterProxy, CommandDescriptor};

/// Cluster id
pub const CLUSTER_ID: u16 = 0x0008;

/// CurrentLevel attribute
pub const ATTR_CURRENT_LEVEL: u16 = 0x0000;
/// RemainingTime attribute
pub const ATTR_REMAINING_TIME: u16 = 0x0001;
/// OnOffTransitionTime attribute
pub const ATTR_ON_OFF_TRANSITION_TIME: u16 = 0x0010;
/// OnLevel attribute
pub const ATTR_ON_LEVEL: u16 = 0x0011;

const MOVE_TO_LEVEL: u8 = 0x00;
const MOVE: u8 = 0x01;
const STEP: u8 = 0x02;
const STOP: u8 = 0x03;
// The with-on/off variants sit four ids above their plain command
const WITH_ON_OFF: u8 = 0x04;

static ATTRIBUTES: [AttributeDescriptor; 4] = [
    AttributeDescriptor {
        id: ATTR_CURRENT_LEVEL,
        name: "CurrentLevel",
        data_type: DataType::Uint8,
        access: Access::ReadOnly,
        reportable: true,
    },
    AttributeDescriptor {
        id: ATTR_REMAINING_TIME,
        name: "RemainingTime",
        data_type: DataType::Uint16,
        access: Access::ReadOnly,
        reportable: false,
    },
    AttributeDescriptor {
        id: ATTR_ON_OFF_TRANSITION_TIME,
        name: "OnOffTransitionTime",
        data_type: DataType::Uint16,
        access: Access::ReadWrite,
        reportable: false,
    },
    AttributeDescriptor {
        id: ATTR_ON_LEVEL,
        name: "OnLevel",
        data_type: DataType::Uint8,
        access: Access::ReadWrite,
        reportable: false,
    },
];

static COMMANDS: [CommandDescriptor; 8] = [
    CommandDescriptor { id: MOVE_TO_LEVEL, name: "MoveToLevel", response: None },
    CommandDescriptor { id: MOVE, name: "Move", response: None },
    CommandDescriptor { id: STEP, name: "Step", response: None },
    CommandDescriptor { id: STOP, name: "Stop", response: None },
    CommandDescriptor { id: MOVE_TO_LEVEL + WITH_ON_OFF, name: "MoveToLevelWithOnOff", response: None },
    CommandDescriptor { id: MOVE + WITH_ON_OFF, name: "MoveWithOnOff", response: None },
    CommandDescriptor { id: STEP + WITH_ON_OFF, name: "StepWithOnOff", response: None },
    CommandDescriptor { id: STOP + WITH_ON_OFF, name: "StopWithOnOff", response: None },
];

/// Level Control descriptor
pub static LEVEL_CONTROL: ClusterDescriptor = ClusterDescriptor {
    id: CLUSTER_ID,
    name: "Level Control",
    attributes: &ATTRIBUTES,
    commands: &COMMANDS,
};

/// Direction of a move or step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelMode {
    /// Towards the maximum level
    Up,
    /// Towards the minimum level
    Down,
}

impl LevelMode {
    fn code(self) -> u8 {
        match self {
            LevelMode::Up => 0x00,
            LevelMode::Down => 0x01,
        }
    }
}

/// Move to level payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveToLevel {
    /// Target level
    pub level: u8,
    /// Transition time in tenths of a second
    pub transition_time: u16,
}

impl CommandPayload for MoveToLevel {
    fn encode(&self, writer: &mut ZclWriter) {
        writer.write_u8(self.level).write_u16(self.transition_time);
    }
}

/// Move payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Move {
    /// Direction
    pub mode: LevelMode,
    /// Units per second
    pub rate: u8,
}

impl CommandPayload for Move {
    fn encode(&self, writer: &mut ZclWriter) {
        writer.write_u8(self.mode.code()).write_u8(self.rate);
    }
}

/// Step payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    /// Direction
    pub mode: LevelMode,
    /// Step size in level units
    pub step_size: u8,
    /// Transition time in tenths of a second
    pub transition_time: u16,
}

impl CommandPayload for Step {
    fn encode(&self, writer: &mut ZclWriter) {
        writer
            .write_u8(self.mode.code())
            .write_u8(self.step_size)
            .write_u16(self.transition_time);
    }
}

fn command_id(base: u8, with_on_off: bool) -> u8 {
    if with_on_off {
        base + WITH_ON_OFF
    } else {
        base
    }
}

/// Typed Level Control proxy
#[derive(Debug)]
pub struct LevelControl {
    proxy: ClusterProxy,
}

impl LevelControl {
    /// Wrap a proxy bound to the Level Control descriptor
    pub fn new(proxy: ClusterProxy) -> Self {
        Self { proxy }
    }

    /// The generic proxy
    pub fn proxy(&self) -> &ClusterProxy {
        &self.proxy
    }

    /// Move to `level` over `transition_time` tenths of a second
    pub async fn move_to_level(&self, level: u8, transition_time: u16, with_on_off: bool) -> Result<()> {
        self.proxy
            .invoke(
                command_id(MOVE_TO_LEVEL, with_on_off),
                &MoveToLevel {
                    level,
                    transition_time,
                },
            )
            .await
    }

    /// Move continuously at `rate` units per second
    pub async fn move_level(&self, mode: LevelMode, rate: u8, with_on_off: bool) -> Result<()> {
        self.proxy
            .invoke(command_id(MOVE, with_on_off), &Move { mode, rate })
            .await
    }

    /// Step by `step_size`
    pub async fn step(
        &self,
        mode: LevelMode,
        step_size: u8,
        transition_time: u16,
        with_on_off: bool,
    ) -> Result<()> {
        self.proxy
            .invoke(
                command_id(STEP, with_on_off),
                &Step {
                    mode,
                    step_size,
                    transition_time,
                },
            )
            .await
    }

    /// Stop any move or step in progress
    pub async fn stop(&self, with_on_off: bool) -> Result<()> {
        self.proxy.invoke(command_id(STOP, with_on_off), &()).await
    }

    /// Read CurrentLevel from the device
    pub async fn current_level(&self) -> Result<u8> {
        let value = self.proxy.read_attribute(ATTR_CURRENT_LEVEL).await?;
        Ok(value.as_u32().unwrap_or_default() as u8)
    }

    /// Get CurrentLevel reports with the default reporting parameters
    pub async fn subscribe_current_level<F>(&self, listener: F) -> Result<Id>
    where
        F: Fn(u8) + Send + Sync + 'static,
    {
        self.proxy
            .subscribe(
                ATTR_CURRENT_LEVEL,
                Arc::new(move |change: &AttributeChange| {
                    if let Some(level) = change.value.as_u32() {
                        listener(level as u8);
                    }
                }),
                Some(ReportingConfiguration::default()),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use zigflow_core::types::NetworkAddress;

    use crate::device::DeviceError;
    use crate::testing::{server_reply, StubTransport};
    use crate::zcl::client::ClusterClient;
    use crate::zcl::frame::FrameType;
    use crate::zcl::status::Status;

    fn level_control(stub: &Arc<StubTransport>) -> LevelControl {
        let client = Arc::new(ClusterClient::new(stub.clone(), Duration::from_millis(200)));
        LevelControl::new(ClusterProxy::new(
            &LEVEL_CONTROL,
            client,
            NetworkAddress(0x1001),
            1,
        ))
    }

    fn accept(stub: &StubTransport) {
        stub.script_reply(|request| {
            Ok(server_reply(
                request,
                FrameType::Global,
                0x0B,
                &[request.header.command_id, 0x00],
            ))
        });
    }

    #[test]
    fn test_payload_layouts() {
        let bytes = MoveToLevel {
            level: 0xFE,
            transition_time: 0x0102,
        }
        .to_bytes();
        assert_eq!(bytes.as_ref(), &[0xFE, 0x02, 0x01]);

        let bytes = Step {
            mode: LevelMode::Down,
            step_size: 16,
            transition_time: 5,
        }
        .to_bytes();
        assert_eq!(bytes.as_ref(), &[0x01, 0x10, 0x05, 0x00]);
    }

    #[tokio::test]
    async fn test_with_on_off_variants_use_shifted_ids() {
        let stub = Arc::new(StubTransport::new());
        accept(&stub);
        accept(&stub);
        let level = level_control(&stub);

        level.move_level(LevelMode::Up, 20, true).await.unwrap();
        level.stop(false).await.unwrap();

        let sent = stub.sent_commands();
        assert_eq!(sent[0].frame[2], 0x05);
        assert_eq!(&sent[0].frame[3..], &[0x00, 0x14]);
        assert_eq!(sent[1].frame[2], 0x03);
        assert_eq!(sent[1].frame.len(), 3);
    }

    #[tokio::test]
    async fn test_move_to_level_failure_status() {
        let stub = Arc::new(StubTransport::new());
        stub.script_reply(|request| {
            Ok(server_reply(request, FrameType::Global, 0x0B, &[0x00, 0x01]))
        });
        let level = level_control(&stub);

        let err = level.move_to_level(0x80, 10, false).await.unwrap_err();
        assert!(matches!(err, DeviceError::Status { status: Status::Failure, .. }));
    }

    #[tokio::test]
    async fn test_current_level() {
        let stub = Arc::new(StubTransport::new());
        stub.script_reply(|request| {
            Ok(server_reply(request, FrameType::Global, 0x01, &[0x00, 0x00, 0x00, 0x20, 0xC8]))
        });
        let level = level_control(&stub);
        assert_eq!(level.current_level().await.unwrap(), 200);
    }
}
