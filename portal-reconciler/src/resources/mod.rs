//! Entity kinds managed under a portal order.

pub mod address_policy;
pub mod connector_topic;
pub mod technical_user;

pub use address_policy::AddressPolicy;
pub use connector_topic::ConnectorTopic;
pub use technical_user::TechnicalUser;

/// Entity kind selector for the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ResourceKind {
    AddressPolicy,
    TechnicalUser,
    ConnectorTopic,
}
