use async_trait::async_trait;

use crate::error::StateError;
use crate::namespace::Namespace;

/// A transactional key-value state store.
///
/// Keys and values are opaque bytes. Keys are totally ordered by their byte
/// representation, which is what ordered structures built on top of the
/// store (such as a time index) rely on.
///
/// ## Transaction Semantics
///
/// All reads and writes go through a `Self::Transaction`. The lifecycle is:
///
/// 1. `begin()`: start a transaction
/// 2. Read and write through the transaction, usually via prefix-scoped views
/// 3. `commit(tx)`: make the writes durable and visible, consuming the
///    transaction, OR `abort(tx)`: discard the writes
///
/// A transaction dropped without commit MUST behave as aborted.
///
/// Writes made inside a transaction are visible to reads in the same
/// transaction and invisible to every other transaction until commit.
/// `commit` fails with [`StateError::Conflict`] when another transaction
/// committed a change to something this one observed or wrote since it began.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` so a store can be shared
/// across tasks; transactions must be `Send` so they can cross await points.
#[async_trait]
pub trait StateStore: Send + Sync + 'static {
    /// The transaction type used by this store.
    type Transaction: StateTransaction + 'static;

    async fn begin(&self) -> Result<Self::Transaction, StateError>;

    async fn commit(&self, tx: Self::Transaction) -> Result<(), StateError>;

    async fn abort(&self, tx: Self::Transaction) -> Result<(), StateError>;
}

/// An open transaction on a [`StateStore`], or a prefix-scoped view of one.
#[async_trait]
pub trait StateTransaction: Send {
    /// Reads the value stored at `key`, `None` if absent.
    async fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, StateError>;

    async fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), StateError>;

    /// Removes `key`. Removing an absent key is not an error.
    async fn delete(&mut self, key: &[u8]) -> Result<(), StateError>;

    /// Returns the entry with the smallest key starting with `prefix`.
    async fn first_with_prefix(
        &mut self,
        prefix: &[u8],
    ) -> Result<Option<(Vec<u8>, Vec<u8>)>, StateError>;

    /// A view of this transaction where every key is implicitly prefixed.
    ///
    /// Views nest: a view of a view concatenates both prefixes.
    fn with_prefix(&mut self, prefix: &[u8]) -> PrefixedTransaction<'_, Self>
    where
        Self: Sized,
    {
        PrefixedTransaction {
            inner: self,
            prefix: prefix.to_vec(),
        }
    }

    /// Shorthand for [`with_prefix`](StateTransaction::with_prefix) with a typed namespace.
    fn with_namespace(&mut self, namespace: &Namespace) -> PrefixedTransaction<'_, Self>
    where
        Self: Sized,
    {
        self.with_prefix(namespace.as_bytes())
    }
}

/// A borrowed, prefix-scoped view of a transaction.
///
/// Keys passed in are prefixed before reaching the underlying transaction and
/// keys handed back by scans have the prefix stripped again, so structures
/// built on a view never see the namespace they live in.
pub struct PrefixedTransaction<'a, T: ?Sized> {
    inner: &'a mut T,
    prefix: Vec<u8>,
}

impl<T: ?Sized> PrefixedTransaction<'_, T> {
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    fn full_key(&self, key: &[u8]) -> Vec<u8> {
        let mut full = Vec::with_capacity(self.prefix.len() + key.len());
        full.extend_from_slice(&self.prefix);
        full.extend_from_slice(key);
        full
    }
}

#[async_trait]
impl<'a, T> StateTransaction for PrefixedTransaction<'a, T>
where
    T: StateTransaction + ?Sized,
{
    async fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, StateError> {
        let key = self.full_key(key);
        self.inner.get(&key).await
    }

    async fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), StateError> {
        let key = self.full_key(key);
        self.inner.set(&key, value).await
    }

    async fn delete(&mut self, key: &[u8]) -> Result<(), StateError> {
        let key = self.full_key(key);
        self.inner.delete(&key).await
    }

    async fn first_with_prefix(
        &mut self,
        prefix: &[u8],
    ) -> Result<Option<(Vec<u8>, Vec<u8>)>, StateError> {
        let scan = self.full_key(prefix);
        let strip = self.prefix.len();
        let found = self.inner.first_with_prefix(&scan).await?;
        Ok(found.map(|(key, value)| (key[strip..].to_vec(), value)))
    }
}
