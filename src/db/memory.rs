//! In-process document store
//!
//! Stands in for MongoDB in dev mode and in tests. Documents are shared by
//! every session opened from the same connector; each session is still
//! opened and closed per invocation so session accounting matches the real
//! connector.
//!
//! Supported filter syntax: field equality (including array membership and
//! dotted paths), `$eq $ne $gt $gte $lt $lte $in $nin $exists`, and the
//! logical `$and $or`. Supported update modifiers: `$set $unset $inc`.

use async_trait::async_trait;
use bson::{oid::ObjectId, Bson, Document};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::convert::ID_FIELD;
use super::{Connector, DocumentStore, Session, UpdateCounts, UpdateSpec};
use crate::types::{DispatchError, Result};

#[derive(Default)]
struct Shared {
    documents: Mutex<Vec<Document>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
    unavailable: AtomicBool,
}

/// Connector over an in-process collection
#[derive(Clone, Default)]
pub struct MemoryConnector {
    shared: Arc<Shared>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions handed out so far
    pub fn sessions_opened(&self) -> usize {
        self.shared.opened.load(AtomicOrdering::SeqCst)
    }

    /// Number of sessions released so far
    pub fn sessions_closed(&self) -> usize {
        self.shared.closed.load(AtomicOrdering::SeqCst)
    }

    /// Make subsequent connects fail, as an unreachable server would
    pub fn set_unavailable(&self, unavailable: bool) {
        self.shared.unavailable.store(unavailable, AtomicOrdering::SeqCst);
    }

    /// Snapshot of the stored documents in insertion order
    pub async fn documents(&self) -> Vec<Document> {
        self.shared.documents.lock().await.clone()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<Session> {
        if self.shared.unavailable.load(AtomicOrdering::SeqCst) {
            return Err(DispatchError::Database(
                "Failed to connect to MongoDB: server selection timeout".to_string(),
            ));
        }

        self.shared.opened.fetch_add(1, AtomicOrdering::SeqCst);
        debug!("Opened in-memory session");

        Ok(Session::new(Box::new(MemoryStore {
            shared: Arc::clone(&self.shared),
        })))
    }
}

struct MemoryStore {
    shared: Arc<Shared>,
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert_one(&self, document: Document) -> Result<Bson> {
        let mut documents = self.shared.documents.lock().await;

        let (id, stored) = match document.get(ID_FIELD).cloned() {
            Some(id) => (id, document),
            None => {
                let id = Bson::ObjectId(ObjectId::new());
                let mut stored = Document::new();
                stored.insert(ID_FIELD, id.clone());
                stored.extend(document);
                (id, stored)
            }
        };

        if documents
            .iter()
            .any(|existing| existing.get(ID_FIELD).is_some_and(|other| values_equal(other, &id)))
        {
            return Err(DispatchError::Database(format!(
                "E11000 duplicate key error index: _id_ dup key: {}",
                id
            )));
        }

        documents.push(stored);
        Ok(id)
    }

    async fn find(&self, filter: Document) -> Result<Vec<Document>> {
        let documents = self.shared.documents.lock().await;
        let mut found = Vec::new();
        for doc in documents.iter() {
            if matches(doc, &filter)? {
                found.push(doc.clone());
            }
        }
        Ok(found)
    }

    async fn update_many(&self, filter: Document, update: UpdateSpec) -> Result<UpdateCounts> {
        let modifiers = match update {
            UpdateSpec::Modifiers(doc) => doc,
            UpdateSpec::Pipeline(_) => {
                return Err(DispatchError::Database(
                    "pipeline updates are not supported by the in-memory store".to_string(),
                ))
            }
        };
        validate_modifiers(&modifiers)?;

        let mut documents = self.shared.documents.lock().await;

        // Stage every change first so a failing document leaves the collection untouched
        let mut staged = Vec::new();
        let mut matched = 0;
        for (index, doc) in documents.iter().enumerate() {
            if matches(doc, &filter)? {
                matched += 1;
                let mut updated = doc.clone();
                apply_modifiers(&mut updated, &modifiers)?;
                if &updated != doc {
                    staged.push((index, updated));
                }
            }
        }

        let modified = staged.len() as u64;
        for (index, updated) in staged {
            documents[index] = updated;
        }
        Ok(UpdateCounts { matched, modified })
    }

    async fn delete_many(&self, filter: Document) -> Result<u64> {
        let mut documents = self.shared.documents.lock().await;

        let mut keep = Vec::with_capacity(documents.len());
        for doc in documents.iter() {
            keep.push(!matches(doc, &filter)?);
        }

        let before = documents.len();
        let mut flags = keep.into_iter();
        documents.retain(|_| flags.next().unwrap_or(true));
        Ok((before - documents.len()) as u64)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) {
        self.shared.closed.fetch_add(1, AtomicOrdering::SeqCst);
    }
}

// =============================================================================
// Filter evaluation
// =============================================================================

fn matches(doc: &Document, filter: &Document) -> Result<bool> {
    for (key, condition) in filter {
        let matched = match key.as_str() {
            "$and" => all_clauses(condition, key)?
                .iter()
                .map(|clause| matches(doc, clause))
                .collect::<Result<Vec<_>>>()?
                .into_iter()
                .all(|m| m),
            "$or" => all_clauses(condition, key)?
                .iter()
                .map(|clause| matches(doc, clause))
                .collect::<Result<Vec<_>>>()?
                .into_iter()
                .any(|m| m),
            op if op.starts_with('$') => {
                return Err(DispatchError::Database(format!("unknown top level operator: {}", op)))
            }
            path => match_condition(lookup(doc, path), condition)?,
        };

        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn all_clauses<'a>(condition: &'a Bson, op: &str) -> Result<Vec<&'a Document>> {
    let invalid = || DispatchError::Database(format!("{} must be a nonempty array of objects", op));
    match condition {
        Bson::Array(items) if !items.is_empty() => items
            .iter()
            .map(|item| match item {
                Bson::Document(doc) => Ok(doc),
                _ => Err(invalid()),
            })
            .collect(),
        _ => Err(invalid()),
    }
}

fn is_operator_document(condition: &Bson) -> Option<&Document> {
    match condition {
        Bson::Document(ops) if !ops.is_empty() && ops.keys().all(|k| k.starts_with('$')) => {
            Some(ops)
        }
        _ => None,
    }
}

fn match_condition(value: Option<&Bson>, condition: &Bson) -> Result<bool> {
    let Some(ops) = is_operator_document(condition) else {
        return Ok(field_equals(value, condition));
    };

    for (op, arg) in ops {
        let matched = match op.as_str() {
            "$eq" => field_equals(value, arg),
            "$ne" => !field_equals(value, arg),
            "$gt" => compares(value, arg, |o| o == Ordering::Greater),
            "$gte" => compares(value, arg, |o| o != Ordering::Less),
            "$lt" => compares(value, arg, |o| o == Ordering::Less),
            "$lte" => compares(value, arg, |o| o != Ordering::Greater),
            "$in" => in_array(value, arg, op)?,
            "$nin" => !in_array(value, arg, op)?,
            "$exists" => value.is_some() == truthy(arg),
            other => {
                return Err(DispatchError::Database(format!("unknown operator: {}", other)))
            }
        };

        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn in_array(value: Option<&Bson>, arg: &Bson, op: &str) -> Result<bool> {
    match arg {
        Bson::Array(candidates) => Ok(candidates.iter().any(|c| field_equals(value, c))),
        _ => Err(DispatchError::Database(format!("{} needs an array", op))),
    }
}

/// Equality with MongoDB's field rules: a missing field equals null and an
/// array field matches any of its elements
fn field_equals(value: Option<&Bson>, target: &Bson) -> bool {
    match value {
        None => matches!(target, Bson::Null),
        Some(Bson::Array(items)) if !matches!(target, Bson::Array(_)) => {
            items.iter().any(|item| values_equal(item, target))
        }
        Some(v) => values_equal(v, target),
    }
}

fn compares(value: Option<&Bson>, target: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    match value {
        Some(Bson::Array(items)) => items
            .iter()
            .any(|item| compare_values(item, target).is_some_and(&accept)),
        Some(v) => compare_values(v, target).is_some_and(accept),
        None => false,
    }
}

fn as_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(*n as f64),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

/// Integers compare exactly; floating point only when a double is involved
fn as_integer(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(n) => Some(*n as i64),
        Bson::Int64(n) => Some(*n),
        _ => None,
    }
}

fn values_equal(a: &Bson, b: &Bson) -> bool {
    if let (Some(x), Some(y)) = (as_integer(a), as_integer(b)) {
        return x == y;
    }
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare_values(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_integer(a), as_integer(b)) {
        return Some(x.cmp(&y));
    }
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.timestamp_millis().cmp(&y.timestamp_millis())),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.bytes().cmp(&y.bytes())),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Null => false,
        other => as_number(other).map_or(true, |n| n != 0.0),
    }
}

fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

// =============================================================================
// Update modifiers
// =============================================================================

fn validate_modifiers(modifiers: &Document) -> Result<()> {
    if modifiers.is_empty() {
        return Err(DispatchError::Database("update document must not be empty".to_string()));
    }
    if let Some(key) = modifiers.keys().find(|k| !k.starts_with('$')) {
        return Err(DispatchError::Database(format!(
            "update document must only contain update operators, found '{}'",
            key
        )));
    }
    Ok(())
}

fn apply_modifiers(doc: &mut Document, modifiers: &Document) -> Result<()> {
    for (op, fields) in modifiers {
        let fields = match fields {
            Bson::Document(fields) => fields,
            _ => {
                return Err(DispatchError::Database(format!(
                    "Modifiers operate on fields but we found a non-object for {}",
                    op
                )))
            }
        };

        for (path, arg) in fields {
            if path == ID_FIELD || path.starts_with("_id.") {
                if op != "$set" || lookup(doc, path) != Some(arg) {
                    return Err(DispatchError::Database(
                        "Performing an update on the path '_id' would modify the immutable field '_id'"
                            .to_string(),
                    ));
                }
                continue;
            }

            match op.as_str() {
                "$set" => set_path(doc, path, arg.clone())?,
                "$unset" => remove_path(doc, path),
                "$inc" => {
                    let current = lookup(doc, path).cloned();
                    let next = match current {
                        None => arg.clone(),
                        Some(current) => add_numbers(&current, arg, path)?,
                    };
                    if as_number(&next).is_none() {
                        return Err(DispatchError::Database(
                            "Cannot increment with non-numeric argument".to_string(),
                        ));
                    }
                    set_path(doc, path, next)?;
                }
                other => {
                    return Err(DispatchError::Database(format!(
                        "Unsupported update operator: {}",
                        other
                    )))
                }
            }
        }
    }
    Ok(())
}

fn set_path(doc: &mut Document, path: &str, value: Bson) -> Result<()> {
    match path.split_once('.') {
        None => {
            doc.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            if !doc.contains_key(head) {
                doc.insert(head, Document::new());
            }
            match doc.get_mut(head) {
                Some(Bson::Document(inner)) => set_path(inner, rest, value),
                _ => Err(DispatchError::Database(format!(
                    "Cannot create field '{}' in element {{{}: ...}}",
                    rest, head
                ))),
            }
        }
    }
}

fn remove_path(doc: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            doc.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(inner)) = doc.get_mut(head) {
                remove_path(inner, rest);
            }
        }
    }
}

fn add_numbers(a: &Bson, b: &Bson, path: &str) -> Result<Bson> {
    let overflow = || {
        DispatchError::Database(format!(
            "Failed to apply $inc operations to current value ({}) at '{}': integer overflow",
            a, path
        ))
    };

    // Int32 sums widen to Int64 like the server does
    if let (Bson::Int32(x), Bson::Int32(y)) = (a, b) {
        return Ok(x
            .checked_add(*y)
            .map(Bson::Int32)
            .unwrap_or(Bson::Int64(*x as i64 + *y as i64)));
    }
    if let (Some(x), Some(y)) = (as_integer(a), as_integer(b)) {
        return x.checked_add(y).map(Bson::Int64).ok_or_else(overflow);
    }

    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => Ok(Bson::Double(x + y)),
        _ => Err(DispatchError::Database(format!(
            "Cannot apply $inc to a value of non-numeric type at '{}'",
            path
        ))),
    }
}
