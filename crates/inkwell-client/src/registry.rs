//! Off-chain stand-in for the access policy.
//!
//! [`InMemoryPolicy`] checks a policy transaction the way the content
//! package's `access` module would on chain: every call must target the
//! package, name an approval function, carry a requested id as its first
//! argument, and reference capabilities the certificate owner actually
//! holds for the collection the id belongs to.

use std::path::Path;

use inkwell_core::policy::{
    CallArg, MoveCall, TransactionKind, ACCESS_MODULE, APPROVE_OWNER, APPROVE_SUBSCRIBER,
    CLOCK_OBJECT_ID,
};
use inkwell_core::session::now_ms;
use inkwell_core::{ObjectId, SessionCertificate};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::key_server::{KeyServerError, PolicyEvaluator};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerCap {
    pub id: String,
    pub owner: String,
    pub collection_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub owner: String,
    pub collection_id: String,
    /// Milliseconds since the Unix epoch.
    pub expires_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: String,
    pub owner: String,
}

/// Capability objects known to the policy, loadable from JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityRegistry {
    pub owner_caps: Vec<OwnerCap>,
    pub subscriptions: Vec<Subscription>,
    pub payment_methods: Vec<PaymentMethod>,
}

impl CapabilityRegistry {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }
}

pub struct InMemoryPolicy {
    package_id: String,
    registry: CapabilityRegistry,
}

impl InMemoryPolicy {
    pub fn new(package_id: impl Into<String>, registry: CapabilityRegistry) -> Self {
        Self {
            package_id: package_id.into(),
            registry,
        }
    }

    fn check_call(
        &self,
        call: &MoveCall,
        args: &[&CallArg],
        owner: &str,
        now: i64,
    ) -> Result<ObjectId, KeyServerError> {
        let id = match args.first() {
            Some(CallArg::Pure(bytes)) => ObjectId::new(bytes.clone()),
            _ => return Err(invalid("first argument must be the object id")),
        };

        match call.function.as_str() {
            APPROVE_OWNER => {
                let [_, CallArg::Object(cap_id), CallArg::Object(collection)] = args else {
                    return Err(invalid("approve_owner takes (id, owner_cap, collection)"));
                };
                let cap = self
                    .registry
                    .owner_caps
                    .iter()
                    .find(|c| &c.id == cap_id)
                    .ok_or_else(|| denied(format!("unknown owner cap {cap_id}")))?;
                if cap.owner != owner {
                    return Err(denied(format!("owner cap {cap_id} not held by {owner}")));
                }
                check_collection(&id, &cap.collection_id, collection)?;
            }
            APPROVE_SUBSCRIBER => {
                let [_, CallArg::Object(sub_id), CallArg::Object(collection), CallArg::Object(payment_id), CallArg::Object(clock)] =
                    args
                else {
                    return Err(invalid(
                        "approve_subscriber takes (id, subscription, collection, payment_method, clock)",
                    ));
                };
                if clock != CLOCK_OBJECT_ID {
                    return Err(invalid("last argument must be the clock"));
                }
                let sub = self
                    .registry
                    .subscriptions
                    .iter()
                    .find(|s| &s.id == sub_id)
                    .ok_or_else(|| denied(format!("unknown subscription {sub_id}")))?;
                if sub.owner != owner {
                    return Err(denied(format!("subscription {sub_id} not held by {owner}")));
                }
                if sub.expires_at <= now {
                    return Err(denied(format!("subscription {sub_id} expired")));
                }
                check_collection(&id, &sub.collection_id, collection)?;
                let has_payment = self
                    .registry
                    .payment_methods
                    .iter()
                    .any(|p| &p.id == payment_id && p.owner == owner);
                if !has_payment {
                    return Err(denied(format!("no payment method {payment_id} on file")));
                }
            }
            other => return Err(invalid(format!("unknown approval function {other}"))),
        }
        Ok(id)
    }
}

impl PolicyEvaluator for InMemoryPolicy {
    fn evaluate(
        &self,
        kind: &TransactionKind,
        ids: &[ObjectId],
        certificate: &SessionCertificate,
    ) -> Result<(), KeyServerError> {
        if kind.commands.is_empty() {
            return Err(invalid("empty policy transaction"));
        }
        let now = now_ms();
        let mut approved = Vec::with_capacity(kind.commands.len());
        for call in &kind.commands {
            if call.package != self.package_id || call.module != ACCESS_MODULE {
                return Err(invalid(format!(
                    "call to {}::{} outside {}::{ACCESS_MODULE}",
                    call.package, call.module, self.package_id
                )));
            }
            let args = kind
                .resolve_arguments(call)
                .ok_or_else(|| invalid("argument index out of range"))?;
            let id = self.check_call(call, &args, &certificate.owner_address, now)?;
            if !ids.contains(&id) {
                return Err(invalid(format!("call approves unrequested id {id}")));
            }
            approved.push(id);
        }
        if let Some(missing) = ids.iter().find(|id| !approved.contains(id)) {
            return Err(invalid(format!("no approval call for id {missing}")));
        }
        Ok(())
    }
}

fn check_collection(id: &ObjectId, cap_collection: &str, arg: &str) -> Result<(), KeyServerError> {
    if cap_collection != arg {
        return Err(denied(format!("capability is for collection {cap_collection}, not {arg}")));
    }
    if !id.belongs_to(arg) {
        return Err(denied(format!("id {id} is not in collection {arg}")));
    }
    Ok(())
}

fn invalid(msg: impl Into<String>) -> KeyServerError {
    KeyServerError::InvalidRequest(msg.into())
}

fn denied(msg: impl Into<String>) -> KeyServerError {
    KeyServerError::NoAccess(msg.into())
}
