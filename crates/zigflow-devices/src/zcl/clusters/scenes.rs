//! Scenes cluster (0x0005).

use crate::device::Result;
use crate::zcl::attribute::{Access, AttributeDescriptor, DataType};
use crate::zcl::codec::{ZclReader, ZclWriter};
use crate::zcl::command::{CommandPayload, ResponsePayload};
use crate::zcl::proxy::{ClusterDescriptor, ClusterProxy, CommandDescriptor};
use crate::zcl::status::Status;

/// Cluster id
pub const CLUSTER_ID: u16 = 0x0005;

/// SceneCount attribute
pub const ATTR_SCENE_COUNT: u16 = 0x0000;
/// CurrentScene attribute
pub const ATTR_CURRENT_SCENE: u16 = 0x0001;
/// CurrentGroup attribute
pub const ATTR_CURRENT_GROUP: u16 = 0x0002;
/// SceneValid attribute
pub const ATTR_SCENE_VALID: u16 = 0x0003;
/// NameSupport attribute
pub const ATTR_NAME_SUPPORT: u16 = 0x0004;
/// LastConfiguredBy attribute
pub const ATTR_LAST_CONFIGURED_BY: u16 = 0x0005;

const ADD_SCENE: u8 = 0x00;
const VIEW_SCENE: u8 = 0x01;
const REMOVE_SCENE: u8 = 0x02;
const REMOVE_ALL_SCENES: u8 = 0x03;
const STORE_SCENE: u8 = 0x04;
const RECALL_SCENE: u8 = 0x05;
const GET_SCENE_MEMBERSHIP: u8 = 0x06;

static ATTRIBUTES: [AttributeDescriptor; 6] = [
    AttributeDescriptor {
        id: ATTR_SCENE_COUNT,
        name: "SceneCount",
        data_type: DataType::Uint8,
        access: Access::ReadOnly,
        reportable: false,
    },
    AttributeDescriptor {
        id: ATTR_CURRENT_SCENE,
        name: "CurrentScene",
        data_type: DataType::Uint8,
        access: Access::ReadOnly,
        reportable: false,
    },
    AttributeDescriptor {
        id: ATTR_CURRENT_GROUP,
        name: "CurrentGroup",
        data_type: DataType::Uint16,
        access: Access::ReadOnly,
        reportable: false,
    },
    AttributeDescriptor {
        id: ATTR_SCENE_VALID,
        name: "SceneValid",
        data_type: DataType::Bool,
        access: Access::ReadOnly,
        reportable: false,
    },
    AttributeDescriptor {
        id: ATTR_NAME_SUPPORT,
        name: "NameSupport",
        data_type: DataType::Bitmap8,
        access: Access::ReadOnly,
        reportable: false,
    },
    AttributeDescriptor {
        id: ATTR_LAST_CONFIGURED_BY,
        name: "LastConfiguredBy",
        data_type: DataType::IeeeAddress,
        access: Access::ReadOnly,
        reportable: false,
    },
];

// Every response shares the id of its request, except recall which gets a default response
static COMMANDS: [CommandDescriptor; 7] = [
    CommandDescriptor { id: ADD_SCENE, name: "AddScene", response: Some(ADD_SCENE) },
    CommandDescriptor { id: VIEW_SCENE, name: "ViewScene", response: Some(VIEW_SCENE) },
    CommandDescriptor { id: REMOVE_SCENE, name: "RemoveScene", response: Some(REMOVE_SCENE) },
    CommandDescriptor { id: REMOVE_ALL_SCENES, name: "RemoveAllScenes", response: Some(REMOVE_ALL_SCENES) },
    CommandDescriptor { id: STORE_SCENE, name: "StoreScene", response: Some(STORE_SCENE) },
    CommandDescriptor { id: RECALL_SCENE, name: "RecallScene", response: None },
    CommandDescriptor { id: GET_SCENE_MEMBERSHIP, name: "GetSceneMembership", response: Some(GET_SCENE_MEMBERSHIP) },
];

/// Scenes descriptor
pub static SCENES: ClusterDescriptor = ClusterDescriptor {
    id: CLUSTER_ID,
    name: "Scenes",
    attributes: &ATTRIBUTES,
    commands: &COMMANDS,
};

/// A scene within a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SceneRef {
    /// Group id
    pub group_id: u16,
    /// Scene id
    pub scene_id: u8,
}

impl CommandPayload for SceneRef {
    fn encode(&self, writer: &mut ZclWriter) {
        writer.write_u16(self.group_id).write_u8(self.scene_id);
    }
}

/// Group-only payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupRef {
    /// Group id
    pub group_id: u16,
}

impl CommandPayload for GroupRef {
    fn encode(&self, writer: &mut ZclWriter) {
        writer.write_u16(self.group_id);
    }
}

/// Add scene payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddScene {
    /// Scene to add
    pub scene: SceneRef,
    /// Transition time in seconds
    pub transition_time: u16,
    /// Scene name
    pub name: String,
}

impl CommandPayload for AddScene {
    fn encode(&self, writer: &mut ZclWriter) {
        self.scene.encode(writer);
        writer
            .write_u16(self.transition_time)
            .write_string(&self.name);
    }
}

fn read_scene(reader: &mut ZclReader) -> Result<SceneRef> {
    Ok(SceneRef {
        group_id: reader.read_u16()?,
        scene_id: reader.read_u8()?,
    })
}

/// Response carrying a status and the scene it refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneStatusResponse<const ID: u8> {
    /// Outcome
    pub status: Status,
    /// Affected scene
    pub scene: SceneRef,
}

impl<const ID: u8> ResponsePayload for SceneStatusResponse<ID> {
    const COMMAND_ID: u8 = ID;

    fn decode(reader: &mut ZclReader) -> Result<Self> {
        Ok(Self {
            status: Status::from_code(reader.read_u8()?),
            scene: read_scene(reader)?,
        })
    }

    fn status(&self) -> Status {
        self.status
    }
}

/// Add scene response
pub type AddSceneResponse = SceneStatusResponse<ADD_SCENE>;
/// Remove scene response
pub type RemoveSceneResponse = SceneStatusResponse<REMOVE_SCENE>;
/// Store scene response
pub type StoreSceneResponse = SceneStatusResponse<STORE_SCENE>;

/// View scene response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewSceneResponse {
    /// Outcome
    pub status: Status,
    /// Viewed scene
    pub scene: SceneRef,
    /// Transition time, present on success
    pub transition_time: Option<u16>,
    /// Scene name, present on success
    pub name: Option<String>,
}

impl ResponsePayload for ViewSceneResponse {
    const COMMAND_ID: u8 = VIEW_SCENE;

    fn decode(reader: &mut ZclReader) -> Result<Self> {
        let status = Status::from_code(reader.read_u8()?);
        let scene = read_scene(reader)?;
        let (transition_time, name) = if status.is_success() {
            (Some(reader.read_u16()?), Some(reader.read_string()?))
        } else {
            (None, None)
        };
        // Extension field sets may follow; they are not interpreted
        Ok(Self {
            status,
            scene,
            transition_time,
            name,
        })
    }

    fn status(&self) -> Status {
        self.status
    }
}

/// Remove all scenes response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoveAllScenesResponse {
    /// Outcome
    pub status: Status,
    /// Group id
    pub group_id: u16,
}

impl ResponsePayload for RemoveAllScenesResponse {
    const COMMAND_ID: u8 = REMOVE_ALL_SCENES;

    fn decode(reader: &mut ZclReader) -> Result<Self> {
        Ok(Self {
            status: Status::from_code(reader.read_u8()?),
            group_id: reader.read_u16()?,
        })
    }

    fn status(&self) -> Status {
        self.status
    }
}

/// Get scene membership response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneMembershipResponse {
    /// Outcome
    pub status: Status,
    /// Remaining scene table capacity (0xFF unknown, 0xFE at least one)
    pub capacity: u8,
    /// Group id
    pub group_id: u16,
    /// Scenes in the group
    pub scenes: Vec<u8>,
}

impl ResponsePayload for SceneMembershipResponse {
    const COMMAND_ID: u8 = GET_SCENE_MEMBERSHIP;

    fn decode(reader: &mut ZclReader) -> Result<Self> {
        let status = Status::from_code(reader.read_u8()?);
        let capacity = reader.read_u8()?;
        let group_id = reader.read_u16()?;
        let scenes = if status.is_success() {
            let count = reader.read_u8()?;
            reader.read_bytes(count as usize)?.to_vec()
        } else {
            Vec::new()
        };
        Ok(Self {
            status,
            capacity,
            group_id,
            scenes,
        })
    }

    fn status(&self) -> Status {
        self.status
    }
}

/// Typed Scenes proxy
#[derive(Debug)]
pub struct Scenes {
    proxy: ClusterProxy,
}

impl Scenes {
    /// Wrap a proxy bound to the Scenes descriptor
    pub fn new(proxy: ClusterProxy) -> Self {
        Self { proxy }
    }

    /// The generic proxy
    pub fn proxy(&self) -> &ClusterProxy {
        &self.proxy
    }

    /// Add a scene
    pub async fn add_scene(&self, scene: AddScene) -> Result<AddSceneResponse> {
        self.proxy.invoke_expecting(ADD_SCENE, &scene).await
    }

    /// View a scene
    pub async fn view_scene(&self, scene: SceneRef) -> Result<ViewSceneResponse> {
        self.proxy.invoke_expecting(VIEW_SCENE, &scene).await
    }

    /// Remove a scene
    pub async fn remove_scene(&self, scene: SceneRef) -> Result<RemoveSceneResponse> {
        self.proxy.invoke_expecting(REMOVE_SCENE, &scene).await
    }

    /// Remove every scene of a group
    pub async fn remove_all_scenes(&self, group_id: u16) -> Result<RemoveAllScenesResponse> {
        self.proxy
            .invoke_expecting(REMOVE_ALL_SCENES, &GroupRef { group_id })
            .await
    }

    /// Store the current state as a scene
    pub async fn store_scene(&self, scene: SceneRef) -> Result<StoreSceneResponse> {
        self.proxy.invoke_expecting(STORE_SCENE, &scene).await
    }

    /// Recall a scene
    pub async fn recall_scene(&self, scene: SceneRef) -> Result<()> {
        self.proxy.invoke(RECALL_SCENE, &scene).await
    }

    /// Scenes of a group
    pub async fn get_scene_membership(&self, group_id: u16) -> Result<SceneMembershipResponse> {
        self.proxy
            .invoke_expecting(GET_SCENE_MEMBERSHIP, &GroupRef { group_id })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use zigflow_core::types::NetworkAddress;

    use crate::testing::{server_reply, StubTransport};
    use crate::zcl::client::ClusterClient;
    use crate::zcl::frame::FrameType;

    fn scenes(stub: &Arc<StubTransport>) -> Scenes {
        let client = Arc::new(ClusterClient::new(stub.clone(), Duration::from_millis(200)));
        Scenes::new(ClusterProxy::new(&SCENES, client, NetworkAddress(0x5005), 1))
    }

    const SCENE: SceneRef = SceneRef {
        group_id: 0x0102,
        scene_id: 0x03,
    };

    #[tokio::test]
    async fn test_add_scene_round_trip() {
        let stub = Arc::new(StubTransport::new());
        stub.script_reply(|request| {
            Ok(server_reply(request, FrameType::ClusterSpecific, 0x00, &[0x00, 0x02, 0x01, 0x03]))
        });
        let scenes = scenes(&stub);

        let response = scenes
            .add_scene(AddScene {
                scene: SCENE,
                transition_time: 2,
                name: "Eve".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(response.scene, SCENE);

        let sent = stub.sent_commands();
        assert_eq!(
            &sent[0].frame[2..],
            &[0x00, 0x02, 0x01, 0x03, 0x02, 0x00, 0x03, b'E', b'v', b'e']
        );
    }

    #[tokio::test]
    async fn test_view_missing_scene() {
        let stub = Arc::new(StubTransport::new());
        stub.script_reply(|request| {
            Ok(server_reply(request, FrameType::ClusterSpecific, 0x01, &[0x8B, 0x02, 0x01, 0x03]))
        });
        let scenes = scenes(&stub);

        let err = scenes.view_scene(SCENE).await.unwrap_err();
        assert_eq!(err.zcl_status(), Some(Status::NotFound));
    }

    #[tokio::test]
    async fn test_view_scene_success_fields() {
        let stub = Arc::new(StubTransport::new());
        stub.script_reply(|request| {
            Ok(server_reply(
                request,
                FrameType::ClusterSpecific,
                0x01,
                &[0x00, 0x02, 0x01, 0x03, 0x0A, 0x00, 0x02, b'o', b'n'],
            ))
        });
        let scenes = scenes(&stub);

        let view = scenes.view_scene(SCENE).await.unwrap();
        assert_eq!(view.transition_time, Some(10));
        assert_eq!(view.name.as_deref(), Some("on"));
    }

    #[tokio::test]
    async fn test_membership_and_recall() {
        let stub = Arc::new(StubTransport::new());
        stub.script_reply(|request| {
            Ok(server_reply(
                request,
                FrameType::ClusterSpecific,
                0x06,
                &[0x00, 0x0C, 0x02, 0x01, 0x02, 0x03, 0x04],
            ))
        });
        stub.script_reply(|request| {
            Ok(server_reply(request, FrameType::Global, 0x0B, &[0x05, 0x00]))
        });
        let scenes = scenes(&stub);

        let membership = scenes.get_scene_membership(0x0102).await.unwrap();
        assert_eq!(membership.capacity, 12);
        assert_eq!(membership.scenes, vec![3, 4]);

        scenes.recall_scene(SCENE).await.unwrap();
    }
}
