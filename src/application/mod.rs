//! Application layer: the six core services and the RPC facade that
//! composes them. Each service owns only port references and stays free of
//! storage or transport detail.

pub mod checkout;
pub mod funnel_flow;
pub mod ledger;
pub mod orders;
pub mod payments;
pub mod pricing;
