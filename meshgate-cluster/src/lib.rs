pub mod discovery;
pub mod dispatch;
pub mod error;

pub use error::{Error, Result};
pub use discovery::{
    ConsulRegistry, ConsulSettings, InstanceSelector, LoadBalancer, LoadBalancingStrategy,
    Registrar, RegistrationDescriptor, RegistrationParams, RegistrationPublisher, RegistryCatalog,
    ServiceInstance, ServiceRegistry,
};
pub use dispatch::{
    AggregateResult, Dispatcher, DispatcherConfig, HttpProber, ProbeResponse, ProbeResult,
    ProbeSettings, Prober,
};
