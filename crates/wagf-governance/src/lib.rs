//! The governed broker: validator chain, retry loop, efficiency cache
//!
//! Free-form model output only mutates simulation state after passing the
//! five validator families in their fixed order. A rejected or unparseable
//! reply is renegotiated with the model up to `max_attempts`, then falls
//! back to the designated no-op skill. Every decision leaves exactly one
//! `InterventionReport`.

mod broker;
mod builtin;
mod cache;
mod chain;
mod rules;
mod validator;

pub use broker::{BrokerConfig, SkillBroker};
pub use builtin::{
    AffordabilityValidator, GroundingValidator, IdentityValidator, NeighborhoodValidator,
};
pub use cache::{CachedDecision, DecisionCache};
pub use chain::ValidatorChain;
pub use rules::{ConfiguredRuleValidator, GovernanceMode, GovernanceRule, ValidatorFamily};
pub use validator::{ValidationContext, Validator};
