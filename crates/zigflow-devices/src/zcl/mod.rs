/*!
 * ZigBee Cluster Library command framework.
 *
 * Requests go out through [`client::ClusterClient`], which frames them
 * ([`frame`]), serializes payloads ([`codec`]) and classifies replies
 * ([`command::ResponseFrame`]). Capability proxies ([`proxy`],
 * [`clusters`]) sit on top.
 */
pub mod attribute;
pub mod client;
pub mod clusters;
pub mod codec;
pub mod command;
pub mod frame;
pub mod global;
pub mod proxy;
pub mod status;

pub use attribute::{Access, Attribute, AttributeDescriptor, AttributeId, AttributeValue, DataType};
pub use client::ClusterClient;
pub use command::{CommandPayload, CommandRequest, CommandResponse, ResponseFrame, ResponsePayload};
pub use frame::{Direction, FrameControl, FrameType, ZclFrame, ZclHeader};
pub use global::ReportingConfiguration;
pub use proxy::{AttributeChange, AttributeListener, ClusterDescriptor, ClusterProxy, CommandDescriptor};
pub use status::Status;
