//! Docker integration: the runtime client seam, the label codec, and the
//! per-service container creators.

pub mod client;
pub mod create;
pub mod label;

pub use client::{
    ContainerClient, ContainerQuery, ContainerRecord, ContainerSpec, DeviceSpec, DockerClient,
    LabelSelector, NetworkInfo, VolumeSpec,
};
pub use create::{
    CreateRequest, CreateRunner, CreateStrategy,
    connect::{ConnectorCreator, ConnectorCreatorConfig},
    identity::{IdentityCreator, IdentityCreatorConfig},
};
pub use label::{LabelEntry, LabelParser, Labeled, ParsedLabel, from_label_map};
