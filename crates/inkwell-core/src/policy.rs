//! Policy calls: the "prove access" transaction fragment key servers run.
//!
//! A [`TransactionBuilder`] accumulates inputs and move calls. For a batch of
//! object ids the client appends one approval call per id and serializes the
//! result in transaction-kind-only form (no sender, no gas): key servers
//! simulate it against chain state and release keys only if every call
//! succeeds.
//!
//! Which call to append depends on the caller's role for the collection,
//! decided by the caller: [`OwnerPolicy`] for the owner-capability holder,
//! [`SubscriberPolicy`] for a paying subscriber.

use serde::{Deserialize, Serialize};

use crate::object::ObjectId;

/// Module holding the approval functions in the content package.
pub const ACCESS_MODULE: &str = "access";
pub const APPROVE_OWNER: &str = "approve_owner";
pub const APPROVE_SUBSCRIBER: &str = "approve_subscriber";
/// Shared system clock object.
pub const CLOCK_OBJECT_ID: &str = "0x6";

// ---------------------------------------------------------------------------
// Transaction kind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallArg {
    /// BCS-style raw bytes (here: the object id as `vector<u8>`).
    Pure(Vec<u8>),
    /// Reference to an on-chain object by id.
    Object(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveCall {
    pub package: String,
    pub module: String,
    pub function: String,
    /// Indices into [`TransactionKind::inputs`].
    pub arguments: Vec<u16>,
}

/// The transaction-kind-only form submitted to key servers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionKind {
    pub inputs: Vec<CallArg>,
    pub commands: Vec<MoveCall>,
}

impl TransactionKind {
    pub fn to_bytes(&self) -> Vec<u8> {
        postcard::to_allocvec(self).unwrap_or_default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }

    /// Resolve a command's argument indices into the inputs they point at.
    /// `None` if any index is out of range.
    pub fn resolve_arguments(&self, call: &MoveCall) -> Option<Vec<&CallArg>> {
        call.arguments
            .iter()
            .map(|&i| self.inputs.get(i as usize))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct TransactionBuilder {
    kind: TransactionKind,
}

/// The policy proof for a batch: an unsigned transaction with one approval
/// call per object id.
pub type PolicyProof = TransactionBuilder;

impl TransactionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pure input and return its index.
    pub fn pure(&mut self, bytes: Vec<u8>) -> u16 {
        self.push_input(CallArg::Pure(bytes))
    }

    /// Add an object input, reusing an existing input for the same id.
    pub fn object(&mut self, object_id: &str) -> u16 {
        if let Some(i) = self
            .kind
            .inputs
            .iter()
            .position(|arg| matches!(arg, CallArg::Object(id) if id == object_id))
        {
            return i as u16;
        }
        self.push_input(CallArg::Object(object_id.to_string()))
    }

    fn push_input(&mut self, arg: CallArg) -> u16 {
        self.kind.inputs.push(arg);
        (self.kind.inputs.len() - 1) as u16
    }

    pub fn move_call(&mut self, package: &str, module: &str, function: &str, arguments: Vec<u16>) {
        self.kind.commands.push(MoveCall {
            package: package.to_string(),
            module: module.to_string(),
            function: function.to_string(),
            arguments,
        });
    }

    pub fn commands(&self) -> &[MoveCall] {
        &self.kind.commands
    }

    pub fn is_empty(&self) -> bool {
        self.kind.commands.is_empty()
    }

    /// True when some command's first argument is `id` as pure bytes.
    pub fn covers(&self, id: &ObjectId) -> bool {
        self.kind.commands.iter().any(|call| {
            call.arguments
                .first()
                .and_then(|&i| self.kind.inputs.get(i as usize))
                .is_some_and(|arg| matches!(arg, CallArg::Pure(bytes) if bytes == id.as_bytes()))
        })
    }

    pub fn build_kind(&self) -> TransactionKind {
        self.kind.clone()
    }

    pub fn build_kind_bytes(&self) -> Vec<u8> {
        self.kind.to_bytes()
    }
}

// ---------------------------------------------------------------------------
// Policy call constructors
// ---------------------------------------------------------------------------

/// Appends one approval call for `id` to a caller-supplied builder.
pub trait PolicyCall: Send + Sync {
    fn append(&self, tx: &mut TransactionBuilder, id: &ObjectId);
}

impl<F> PolicyCall for F
where
    F: Fn(&mut TransactionBuilder, &ObjectId) + Send + Sync,
{
    fn append(&self, tx: &mut TransactionBuilder, id: &ObjectId) {
        self(tx, id)
    }
}

/// `access::approve_owner(id, owner_cap, collection)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerPolicy {
    pub package: String,
    pub owner_cap_id: String,
    pub collection_id: String,
}

impl PolicyCall for OwnerPolicy {
    fn append(&self, tx: &mut TransactionBuilder, id: &ObjectId) {
        let id_arg = tx.pure(id.as_bytes().to_vec());
        let cap = tx.object(&self.owner_cap_id);
        let collection = tx.object(&self.collection_id);
        tx.move_call(
            &self.package,
            ACCESS_MODULE,
            APPROVE_OWNER,
            vec![id_arg, cap, collection],
        );
    }
}

/// `access::approve_subscriber(id, subscription_cap, collection, payment_method, clock)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberPolicy {
    pub package: String,
    pub subscription_cap_id: String,
    pub collection_id: String,
    pub payment_method_id: String,
}

impl PolicyCall for SubscriberPolicy {
    fn append(&self, tx: &mut TransactionBuilder, id: &ObjectId) {
        let id_arg = tx.pure(id.as_bytes().to_vec());
        let cap = tx.object(&self.subscription_cap_id);
        let collection = tx.object(&self.collection_id);
        let payment = tx.object(&self.payment_method_id);
        let clock = tx.object(CLOCK_OBJECT_ID);
        tx.move_call(
            &self.package,
            ACCESS_MODULE,
            APPROVE_SUBSCRIBER,
            vec![id_arg, cap, collection, payment, clock],
        );
    }
}

/// Build the proof for a batch: one approval call per id, in order.
pub fn build_policy_proof(policy: &dyn PolicyCall, ids: &[ObjectId]) -> PolicyProof {
    let mut tx = TransactionBuilder::new();
    for id in ids {
        policy.append(&mut tx, id);
    }
    tx
}
