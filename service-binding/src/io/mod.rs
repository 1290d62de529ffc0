//! Reading [servicebinding.io](https://servicebinding.io/spec/core/1.0.0/) bindings that
//! carry a `.metadata` file.

mod accessor;
mod loader;
mod metadata;

pub use accessor::{
    EnvReader, ServiceBindingAccessor, ServiceBindingIoAccessor, ServiceBindingIoAccessorBuilder,
    SERVICE_BINDING_ROOT,
};
pub use loader::{ServiceBindingIoLoader, METADATA_FILE};
pub use metadata::{BindingMetadata, BindingProperty, PropertyFormat};
