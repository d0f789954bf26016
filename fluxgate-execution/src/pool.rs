use std::{
    ops::Deref,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};
use tokio::sync::{Semaphore, SemaphorePermit};

/// Round-robin dispenser of private clients, one per API credential.
///
/// A semaphore sized to the credential count bounds concurrent private
/// calls; the permit is held by the returned [`PooledClient`] for the
/// duration of exactly one driver call.
#[derive(Debug)]
pub struct CredentialPool<Client> {
    clients: Vec<Client>,
    cursor: AtomicUsize,
    semaphore: Semaphore,
}

impl<Client> CredentialPool<Client> {
    pub fn new(clients: Vec<Client>) -> Self {
        assert!(!clients.is_empty(), "CredentialPool requires at least one client");

        let permits = clients.len();
        Self {
            clients,
            cursor: AtomicUsize::new(0),
            semaphore: Semaphore::new(permits),
        }
    }

    pub async fn acquire(&self) -> PooledClient<'_, Client> {
        let permit = self
            .semaphore
            .acquire()
            .await
            .expect("credential semaphore is never closed");

        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.clients.len();

        PooledClient {
            client: &self.clients[index],
            _permit: permit,
        }
    }

    /// True while every credential is in flight.
    pub fn is_contended(&self) -> bool {
        self.semaphore.available_permits() == 0
    }

    pub fn clients(&self) -> &[Client] {
        &self.clients
    }
}

/// Scoped credential acquisition: dereferences to the dispensed client and
/// releases the permit on drop.
#[derive(Debug)]
pub struct PooledClient<'pool, Client> {
    client: &'pool Client,
    _permit: SemaphorePermit<'pool>,
}

impl<Client> Deref for PooledClient<'_, Client> {
    type Target = Client;

    fn deref(&self) -> &Self::Target {
        self.client
    }
}

/// Public-data client with its own request pacing, independent of the
/// private credential semaphore.
#[derive(Debug)]
pub struct PublicPool<Client> {
    client: Client,
    delay: Duration,
}

impl<Client> PublicPool<Client> {
    pub fn new(client: Client, delay: Duration) -> Self {
        Self { client, delay }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn dispenses_round_robin() {
        let pool = CredentialPool::new(vec!["a", "b", "c"]);

        assert_eq!(*pool.acquire().await, "a");
        assert_eq!(*pool.acquire().await, "b");
        assert_eq!(*pool.acquire().await, "c");
        assert_eq!(*pool.acquire().await, "a");
    }

    #[tokio::test]
    async fn permits_bound_concurrent_acquisitions() {
        let pool = CredentialPool::new(vec![0u8]);

        let held = pool.acquire().await;
        assert!(pool.is_contended());

        let blocked =
            tokio::time::timeout(Duration::from_millis(20), pool.acquire()).await;
        assert!(blocked.is_err());

        drop(held);
        assert!(!pool.is_contended());
        let _reacquired =
            tokio::time::timeout(Duration::from_millis(20), pool.acquire())
                .await
                .unwrap();
    }
}
