//! Service discovery: registry access, instance selection and
//! self-registration

pub mod consul;
pub mod load_balancer;
pub mod registration;
pub mod registry;

pub use consul::{ConsulRegistry, ConsulSettings};
pub use load_balancer::{InstanceSelector, LoadBalancer, LoadBalancingStrategy};
pub use registration::{
    HealthCheckDescriptor, HealthCheckPolicy, RegistrationDescriptor, RegistrationParams,
    RegistrationPublisher,
};
pub use registry::{Registrar, RegistryCatalog, ServiceInstance, ServiceRegistry};
