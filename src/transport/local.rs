//! Local short-circuit transport shim.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;

use async_trait::async_trait;

use super::Transport;
use super::VnodeHandler;
use crate::dht::Vnode;
use crate::error::Error;
use crate::error::Result;

/// Provides fast routing to local vnodes and falls through to a
/// wrapped transport for everything else. Any RPC whose target vnode
/// is registered in this process is served by direct method call.
pub struct LocalTransport {
    remote: Arc<dyn Transport>,
    local: RwLock<HashMap<String, Arc<dyn VnodeHandler>>>,
}

impl LocalTransport {
    /// Wrap `remote`, or a [BlackholeTransport] when none is given.
    pub fn new(remote: Option<Arc<dyn Transport>>) -> Self {
        let remote = remote.unwrap_or_else(|| Arc::new(BlackholeTransport));
        Self {
            remote,
            local: RwLock::new(HashMap::new()),
        }
    }

    fn lookup(&self, target: &Vnode) -> Result<Option<Arc<dyn VnodeHandler>>> {
        let local = self.local.read().map_err(|_| Error::StateLock)?;
        Ok(local.get(&target.to_string()).cloned())
    }

    /// Resolve the handler serving `target`, for wire transports
    /// dispatching inbound RPCs. An RPC that arrives for a vnode not
    /// registered on this host is a structured error.
    pub fn handler_for(&self, target: &Vnode) -> Result<Arc<dyn VnodeHandler>> {
        self.lookup(target)?.ok_or_else(|| Error::VnodeNotFound {
            host: target.host.clone(),
            id: target.to_string(),
        })
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn list_vnodes(&self, host: &str) -> Result<Vec<Vnode>> {
        let matched: Vec<Vnode> = {
            let local = self.local.read().map_err(|_| Error::StateLock)?;
            local
                .values()
                .filter(|h| h.vnode().host == host)
                .map(|h| h.vnode().clone())
                .collect()
        };
        if !matched.is_empty() {
            return Ok(matched);
        }
        self.remote.list_vnodes(host).await
    }

    async fn ping(&self, target: &Vnode) -> Result<bool> {
        if self.lookup(target)?.is_some() {
            return Ok(true);
        }
        self.remote.ping(target).await
    }

    async fn get_predecessor(&self, target: &Vnode) -> Result<Option<Vnode>> {
        match self.lookup(target)? {
            Some(handler) => handler.get_predecessor().await,
            None => self.remote.get_predecessor(target).await,
        }
    }

    async fn notify(&self, target: &Vnode, claimant: &Vnode) -> Result<Vec<Vnode>> {
        match self.lookup(target)? {
            Some(handler) => handler.notify(claimant.clone()).await,
            None => self.remote.notify(target, claimant).await,
        }
    }

    async fn find_successors(&self, target: &Vnode, n: usize, key: &[u8]) -> Result<Vec<Vnode>> {
        match self.lookup(target)? {
            Some(handler) => handler.find_successors(n, key).await,
            None => self.remote.find_successors(target, n, key).await,
        }
    }

    async fn clear_predecessor(&self, target: &Vnode, leaving: &Vnode) -> Result<()> {
        match self.lookup(target)? {
            Some(handler) => handler.clear_predecessor(leaving.clone()).await,
            None => self.remote.clear_predecessor(target, leaving).await,
        }
    }

    async fn skip_successor(&self, target: &Vnode, leaving: &Vnode) -> Result<()> {
        match self.lookup(target)? {
            Some(handler) => handler.skip_successor(leaving.clone()).await,
            None => self.remote.skip_successor(target, leaving).await,
        }
    }

    fn register(&self, handler: Arc<dyn VnodeHandler>) {
        if let Ok(mut local) = self.local.write() {
            local.insert(handler.vnode().to_string(), handler.clone());
        }
        self.remote.register(handler);
    }

    fn deregister(&self, target: &Vnode) {
        if let Ok(mut local) = self.local.write() {
            local.remove(&target.to_string());
        }
        self.remote.deregister(target);
    }
}

/// Used to blackhole traffic: every remote call fails, every probe
/// answers "not alive".
pub struct BlackholeTransport;

#[async_trait]
impl Transport for BlackholeTransport {
    async fn list_vnodes(&self, host: &str) -> Result<Vec<Vnode>> {
        Err(Error::Unreachable(host.to_string()))
    }

    async fn ping(&self, _target: &Vnode) -> Result<bool> {
        Ok(false)
    }

    async fn get_predecessor(&self, target: &Vnode) -> Result<Option<Vnode>> {
        Err(Error::Unreachable(target.host.clone()))
    }

    async fn notify(&self, target: &Vnode, _claimant: &Vnode) -> Result<Vec<Vnode>> {
        Err(Error::Unreachable(target.host.clone()))
    }

    async fn find_successors(&self, target: &Vnode, _n: usize, _key: &[u8]) -> Result<Vec<Vnode>> {
        Err(Error::Unreachable(target.host.clone()))
    }

    async fn clear_predecessor(&self, target: &Vnode, _leaving: &Vnode) -> Result<()> {
        Err(Error::Unreachable(target.host.clone()))
    }

    async fn skip_successor(&self, target: &Vnode, _leaving: &Vnode) -> Result<()> {
        Err(Error::Unreachable(target.host.clone()))
    }

    fn register(&self, _handler: Arc<dyn VnodeHandler>) {}

    fn deregister(&self, _target: &Vnode) {}
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct MockHandler {
        vnode: Vnode,
        pred: Option<Vnode>,
        succ_list: Vec<Vnode>,
        notified_by: Mutex<Option<Vnode>>,
        asked_key: Mutex<Option<Vec<u8>>>,
    }

    impl MockHandler {
        fn new(vnode: Vnode) -> Self {
            Self {
                vnode,
                pred: None,
                succ_list: vec![],
                notified_by: Mutex::new(None),
                asked_key: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl VnodeHandler for MockHandler {
        fn vnode(&self) -> &Vnode {
            &self.vnode
        }

        async fn get_predecessor(&self) -> Result<Option<Vnode>> {
            Ok(self.pred.clone())
        }

        async fn notify(&self, claimant: Vnode) -> Result<Vec<Vnode>> {
            *self.notified_by.lock().unwrap() = Some(claimant);
            Ok(self.succ_list.clone())
        }

        async fn find_successors(&self, n: usize, key: &[u8]) -> Result<Vec<Vnode>> {
            *self.asked_key.lock().unwrap() = Some(key.to_vec());
            Ok(self.succ_list.iter().take(n).cloned().collect())
        }

        async fn clear_predecessor(&self, _leaving: Vnode) -> Result<()> {
            Ok(())
        }

        async fn skip_successor(&self, _leaving: Vnode) -> Result<()> {
            Ok(())
        }
    }

    fn vn(id: u8, host: &str) -> Vnode {
        Vnode::new(vec![id], host)
    }

    #[tokio::test]
    async fn test_local_ping() {
        let lt = LocalTransport::new(None);
        let target = vn(1, "alpha:9000");
        lt.register(Arc::new(MockHandler::new(target.clone())));

        assert!(lt.ping(&target).await.unwrap());

        // Unknown vnodes fall through to the blackhole.
        assert!(!lt.ping(&vn(2, "alpha:9000")).await.unwrap());
    }

    #[tokio::test]
    async fn test_local_get_predecessor() {
        let lt = LocalTransport::new(None);
        let target = vn(1, "alpha:9000");
        let mut handler = MockHandler::new(target.clone());
        handler.pred = Some(vn(9, "beta:9000"));
        lt.register(Arc::new(handler));

        let pred = lt.get_predecessor(&target).await.unwrap();
        assert_eq!(pred, Some(vn(9, "beta:9000")));
    }

    #[tokio::test]
    async fn test_local_notify_and_find() {
        let lt = LocalTransport::new(None);
        let target = vn(1, "alpha:9000");
        let mut handler = MockHandler::new(target.clone());
        handler.succ_list = vec![vn(2, "alpha:9000"), vn(3, "beta:9000")];
        let handler = Arc::new(handler);
        lt.register(handler.clone());

        let claimant = vn(7, "gamma:9000");
        let succs = lt.notify(&target, &claimant).await.unwrap();
        assert_eq!(succs, handler.succ_list);
        assert_eq!(*handler.notified_by.lock().unwrap(), Some(claimant));

        let found = lt.find_successors(&target, 1, &[0x42]).await.unwrap();
        assert_eq!(found, vec![vn(2, "alpha:9000")]);
        assert_eq!(*handler.asked_key.lock().unwrap(), Some(vec![0x42]));
    }

    #[tokio::test]
    async fn test_list_vnodes_short_circuits_by_host() {
        let lt = LocalTransport::new(None);
        lt.register(Arc::new(MockHandler::new(vn(1, "alpha:9000"))));
        lt.register(Arc::new(MockHandler::new(vn(2, "alpha:9000"))));

        let mut listed = lt.list_vnodes("alpha:9000").await.unwrap();
        listed.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(listed, vec![vn(1, "alpha:9000"), vn(2, "alpha:9000")]);

        // A host with no registered vnodes is forwarded and blackholed.
        assert!(lt.list_vnodes("delta:9000").await.is_err());
    }

    #[tokio::test]
    async fn test_handler_for_missing_vnode() {
        let lt = LocalTransport::new(None);
        lt.register(Arc::new(MockHandler::new(vn(1, "alpha:9000"))));

        assert!(lt.handler_for(&vn(1, "alpha:9000")).is_ok());
        let err = lt.handler_for(&vn(2, "alpha:9000")).unwrap_err();
        assert!(matches!(err, Error::VnodeNotFound { .. }));
    }

    #[tokio::test]
    async fn test_deregister() {
        let lt = LocalTransport::new(None);
        let target = vn(1, "alpha:9000");
        lt.register(Arc::new(MockHandler::new(target.clone())));
        assert!(lt.ping(&target).await.unwrap());

        lt.deregister(&target);
        assert!(!lt.ping(&target).await.unwrap());
    }
}
