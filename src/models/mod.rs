//! The data model shared by the scheduler and the configurators

pub mod catalogs;
pub mod execution;
pub mod node;
pub mod offer;
pub mod plan;
pub mod resources;
pub mod volumes;

pub use catalogs::{
    IngestCatalog, InputFileCatalog, InputFileDescriptor, InputValue, InterfaceDefinition,
    JobData, JobTypeCatalog, JobTypeMetadata, ScanCatalog, SecretsProvider, SettingDecl,
    StrikeCatalog, WorkspaceCatalog,
};
pub use execution::{JobExecution, Phase, Task, TaskType};
pub use node::NodeRef;
pub use offer::{Offer, ResourceSet};
pub use plan::{ExecutionPlan, Mode, Mount, WorkspaceBinding};
pub use resources::ResourceVector;
pub use volumes::{Volume, VolumeSource};
