//! Host identifier to built [`Stack`], constructed lazily and kept for the
//! process lifetime.

use futures::future::BoxFuture;
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::stack::Stack;

pub type Builder<T> = Box<dyn Fn(String) -> BoxFuture<'static, Result<T>> + Send + Sync>;

/// Builds each host's value at most once. A failed build stores nothing, so
/// the next lookup tries again.
pub struct Registry<T> {
    builder: Builder<T>,
    entries: Mutex<HashMap<String, Arc<T>>>,
}

pub type StackRegistry = Registry<Stack>;

impl<T> Registry<T> {
    pub fn new<F>(builder: F) -> Self
    where
        F: Fn(String) -> BoxFuture<'static, Result<T>> + Send + Sync + 'static,
    {
        Self {
            builder: Box::new(builder),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, host: &str) -> Result<Arc<T>> {
        // held across the build so concurrent lookups of a new host wait for it
        let mut entries = self.entries.lock().await;
        if let Some(existing) = entries.get(host) {
            return Ok(existing.clone());
        }
        debug!("Building stack for {}", host);
        let built = Arc::new((self.builder)(host.to_string()).await?);
        entries.insert(host.to_string(), built.clone());
        Ok(built)
    }

    pub async fn hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = self.entries.lock().await.keys().cloned().collect();
        hosts.sort();
        hosts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StackError;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn builds_each_host_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let registry: Registry<String> = Registry::new(move |host| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok(format!("stack for {}", host)) }.boxed()
        });

        let first = registry.get("web1").await.unwrap();
        let second = registry.get("web1").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        registry.get("web2").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(registry.hosts().await, vec!["web1", "web2"]);
    }

    #[tokio::test]
    async fn failed_builds_are_not_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let registry: Registry<u32> = Registry::new(move |_| {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(StackError::Configuration("database".into()))
                } else {
                    Ok(7)
                }
            }
            .boxed()
        });

        assert!(registry.get("web1").await.is_err());
        assert_eq!(*registry.get("web1").await.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
