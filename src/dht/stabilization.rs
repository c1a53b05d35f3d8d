//! Periodic stabilization: the maintenance heartbeat of a vnode.
//!
//! Each round runs four repair steps in order. A failing step is
//! logged and does not abort the others; after the last step the
//! round stamps the wall time. One maintenance task per vnode owns
//! the schedule and exits when the ring signals shutdown.

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;

use super::local::LocalVnode;
use crate::config::rand_stabilize;
use crate::config::CandidatePolicy;
use crate::dht::id::between;
use crate::dht::id::power_offset;
use crate::error::Error;
use crate::error::Result;
use crate::transport::Transport;

impl LocalVnode {
    /// Run one maintenance round.
    pub(crate) async fn stabilize(&self) {
        if let Err(e) = self.check_new_successor().await {
            tracing::error!("[stabilize] {}: failed checking for new successor: {}", self.vnode(), e);
        }

        if let Err(e) = self.notify_successor().await {
            tracing::error!("[stabilize] {}: failed notifying successor: {}", self.vnode(), e);
        }

        if let Err(e) = self.fix_finger_table().await {
            tracing::error!("[stabilize] {}: failed fixing finger table: {}", self.vnode(), e);
        }

        if let Err(e) = self.check_predecessor().await {
            tracing::error!("[stabilize] {}: failed checking predecessor: {}", self.vnode(), e);
        }

        if let Ok(mut stamp) = self.stabilized.lock() {
            *stamp = Some(Instant::now());
        }
    }

    /// Ask the current successor for its predecessor; if that node
    /// sits between us and the successor, splice it in as the new
    /// head. On transport failure, walk the successor list past dead
    /// entries and retry against the first live one.
    pub(crate) async fn check_new_successor(&self) -> Result<()> {
        let transport = &self.ctx.transport;

        // A live-but-failing successor could otherwise make the
        // retry loop spin forever.
        let max_rounds = self.successors.capacity() + 1;

        for _ in 0..max_rounds {
            let succ = match self.successors.head()? {
                Some(succ) => succ,
                // Stabilizing a vnode that was never given a successor
                // is a harness bug, not a runtime condition.
                None => panic!("vnode {} has no successor", self.vnode()),
            };

            let maybe_pred = match transport.get_predecessor(&succ).await {
                Ok(p) => p,
                Err(err) => {
                    let known = self.successors.known()?;
                    for i in 0..known {
                        let head = match self.successors.head()? {
                            Some(head) => head,
                            None => return Err(err),
                        };
                        if transport.ping(&head).await.unwrap_or(false) {
                            break;
                        }
                        // Never eliminate the last successor we know of.
                        if i + 1 == known {
                            return Err(Error::AllSuccessorsDead);
                        }
                        self.successors.shift_left()?;
                    }
                    // Found a live entry; retry the step from the top.
                    continue;
                }
            };

            if let Some(candidate) = maybe_pred {
                if between(&self.vnode().id, &succ.id, &candidate.id) {
                    let adopt = match transport.ping(&candidate).await {
                        Ok(alive) => alive,
                        Err(_) => {
                            self.ctx.config.candidate_policy == CandidatePolicy::AcceptUnknown
                        }
                    };
                    if adopt {
                        self.successors.insert_front(candidate)?;
                    }
                }
            }
            return Ok(());
        }

        Err(Error::Unreachable(
            "successor retry budget exhausted".into(),
        ))
    }

    /// Notify the successor of ourselves and refresh our tail of the
    /// successor list from its reply.
    pub(crate) async fn notify_successor(&self) -> Result<()> {
        let succ = match self.successors.head()? {
            Some(succ) => succ,
            None => return Ok(()),
        };

        let succ_list = self.ctx.transport.notify(&succ, self.vnode()).await?;

        let keep = succ_list.len().min(self.ctx.config.num_successors.saturating_sub(1));
        self.successors.fill_tail(&succ_list[..keep])?;
        Ok(())
    }

    /// Repair one finger entry per round.
    pub(crate) async fn fix_finger_table(&self) -> Result<()> {
        let offset = {
            let finger = self.lock_finger()?;
            power_offset(&self.vnode().id, finger.fix_index(), finger.bits())
        };

        let found = self.find_successors(1, &offset).await?;
        if let Some(node) = found.into_iter().next() {
            self.lock_finger()?.apply_fix(node);
        }
        Ok(())
    }

    /// Probe the predecessor; a definitive "not alive" clears it,
    /// transport errors leave it for the next round.
    pub(crate) async fn check_predecessor(&self) -> Result<()> {
        let pred = match self.lock_predecessor()?.clone() {
            Some(pred) => pred,
            None => return Ok(()),
        };

        match self.ctx.transport.ping(&pred).await {
            Ok(false) => {
                let mut guard = self.lock_predecessor()?;
                if guard.as_ref() == Some(&pred) {
                    *guard = None;
                }
            }
            Ok(true) => {}
            Err(e) => {
                tracing::debug!("[stabilize] {}: predecessor ping errored: {}", self.vnode(), e);
            }
        }
        Ok(())
    }
}

/// Spawn the maintenance task of a vnode: sleep a randomized
/// interval, run a round, repeat until the ring signals shutdown.
pub(crate) fn spawn_maintenance(vnode: Arc<LocalVnode>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let ctx = vnode.ctx.clone();
        let mut shutdown = ctx.subscribe_shutdown();
        loop {
            if ctx.is_shutdown() {
                break;
            }
            let delay = rand_stabilize(&ctx.config);
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(delay) => {
                    if ctx.is_shutdown() {
                        break;
                    }
                    vnode.stabilize().await;
                }
            }
        }
        tracing::debug!("[stabilize] {} maintenance task exited", vnode.vnode());
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use async_trait::async_trait;

    use super::*;
    use crate::config::Config;
    use crate::dht::Vnode;
    use crate::error::Result;
    use crate::ring::RingContext;
    use crate::transport::VnodeHandler;

    /// Counts every remote call and fails all of them.
    #[derive(Default)]
    struct CountingTransport {
        calls: AtomicUsize,
    }

    impl CountingTransport {
        fn count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn bump(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Transport for CountingTransport {
        async fn list_vnodes(&self, host: &str) -> Result<Vec<Vnode>> {
            self.bump();
            Err(Error::Unreachable(host.to_string()))
        }

        async fn ping(&self, _target: &Vnode) -> Result<bool> {
            self.bump();
            Ok(false)
        }

        async fn get_predecessor(&self, target: &Vnode) -> Result<Option<Vnode>> {
            self.bump();
            Err(Error::Unreachable(target.host.clone()))
        }

        async fn notify(&self, target: &Vnode, _claimant: &Vnode) -> Result<Vec<Vnode>> {
            self.bump();
            Err(Error::Unreachable(target.host.clone()))
        }

        async fn find_successors(
            &self,
            target: &Vnode,
            _n: usize,
            _key: &[u8],
        ) -> Result<Vec<Vnode>> {
            self.bump();
            Err(Error::Unreachable(target.host.clone()))
        }

        async fn clear_predecessor(&self, target: &Vnode, _leaving: &Vnode) -> Result<()> {
            self.bump();
            Err(Error::Unreachable(target.host.clone()))
        }

        async fn skip_successor(&self, target: &Vnode, _leaving: &Vnode) -> Result<()> {
            self.bump();
            Err(Error::Unreachable(target.host.clone()))
        }

        fn register(&self, _handler: std::sync::Arc<dyn VnodeHandler>) {}

        fn deregister(&self, _target: &Vnode) {}
    }

    #[tokio::test]
    async fn test_single_node_stabilize_stays_local() {
        let remote = Arc::new(CountingTransport::default());
        let ctx = RingContext::new_for_tests_with_transport(
            Config::new("solo:9000"),
            remote.clone(),
        );

        let vn = Arc::new(LocalVnode::new(ctx.clone(), 0));
        vn.successors.set_head(vn.vnode().clone()).unwrap();
        ctx.transport.register(vn.clone());

        vn.stabilize().await;

        assert_eq!(remote.count(), 0, "remote transport was contacted");
        assert!(vn.stabilized.lock().unwrap().is_some());
        // The round resolved every lookup to the vnode itself.
        assert_eq!(vn.successors.head().unwrap(), Some(vn.vnode().clone()));
    }

    #[tokio::test]
    async fn test_dead_successor_advance() {
        let ctx = RingContext::new_for_tests(Config::new("trio:9000"));

        let mut vnodes: Vec<Arc<LocalVnode>> =
            (0..3u16).map(|i| Arc::new(LocalVnode::new(ctx.clone(), i))).collect();
        vnodes.sort_by(|a, b| a.vnode().id.cmp(&b.vnode().id));
        let (v1, v2, v3) = (vnodes[0].clone(), vnodes[1].clone(), vnodes[2].clone());

        v1.successors
            .replace(&[v2.vnode().clone(), v3.vnode().clone()])
            .unwrap();

        for vn in &vnodes {
            ctx.transport.register(vn.clone());
        }
        // v2 dies without announcing.
        ctx.transport.deregister(v2.vnode());

        v1.check_new_successor().await.unwrap();
        assert_eq!(v1.successors.head().unwrap(), Some(v3.vnode().clone()));
    }

    #[tokio::test]
    async fn test_all_successors_dead() {
        let ctx = RingContext::new_for_tests(Config::new("pair:9000"));
        let v1 = Arc::new(LocalVnode::new(ctx.clone(), 0));
        let v2 = Arc::new(LocalVnode::new(ctx.clone(), 1));

        // Only v1 is registered; its lone successor v2 is dead and
        // must never be removed.
        v1.successors.replace(&[v2.vnode().clone()]).unwrap();
        ctx.transport.register(v1.clone());

        let err = v1.check_new_successor().await.unwrap_err();
        assert!(matches!(err, Error::AllSuccessorsDead));
        assert_eq!(v1.successors.head().unwrap(), Some(v2.vnode().clone()));
    }

    #[tokio::test]
    async fn test_check_predecessor_clears_dead() {
        let ctx = RingContext::new_for_tests(Config::new("duo:9000"));
        let v1 = Arc::new(LocalVnode::new(ctx.clone(), 0));
        let v2 = Arc::new(LocalVnode::new(ctx.clone(), 1));
        ctx.transport.register(v1.clone());

        // Live predecessor survives the probe.
        ctx.transport.register(v2.clone());
        v1.notify(v2.vnode().clone()).await.unwrap();
        v1.check_predecessor().await.unwrap();
        assert!(v1.lock_predecessor().unwrap().is_some());

        // Dead predecessor is cleared.
        ctx.transport.deregister(v2.vnode());
        v1.check_predecessor().await.unwrap();
        assert!(v1.lock_predecessor().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fingers_converge_to_responsible_nodes() {
        use crate::dht::id::between_right_incl;

        let ctx = RingContext::new_for_tests(Config::new("pair:9000"));
        let mut vnodes: Vec<Arc<LocalVnode>> =
            (0..2u16).map(|i| Arc::new(LocalVnode::new(ctx.clone(), i))).collect();
        vnodes.sort_by(|a, b| a.vnode().id.cmp(&b.vnode().id));
        let (v1, v2) = (vnodes[0].clone(), vnodes[1].clone());

        v1.successors.set_head(v2.vnode().clone()).unwrap();
        v2.successors.set_head(v1.vnode().clone()).unwrap();
        for vn in &vnodes {
            ctx.transport.register(vn.clone());
        }

        // Quiescent two-node ring: enough rounds repair all m entries
        // (coalescing covers a whole run of offsets per round).
        for _ in 0..200 {
            v1.stabilize().await;
        }

        let finger = v1.lock_finger().unwrap().clone();
        for i in 0..finger.bits() {
            let offset = power_offset(&v1.vnode().id, i, finger.bits());
            let expected = if between_right_incl(&v1.vnode().id, &v2.vnode().id, &offset) {
                v2.vnode()
            } else {
                v1.vnode()
            };
            assert_eq!(finger.get(i), Some(expected), "finger entry {i}");
        }
    }

    #[tokio::test]
    async fn test_notify_successor_fills_tail() {
        let ctx = RingContext::new_for_tests(Config::new("quad:9000"));
        let mut vnodes: Vec<Arc<LocalVnode>> =
            (0..3u16).map(|i| Arc::new(LocalVnode::new(ctx.clone(), i))).collect();
        vnodes.sort_by(|a, b| a.vnode().id.cmp(&b.vnode().id));
        let (v1, v2, v3) = (vnodes[0].clone(), vnodes[1].clone(), vnodes[2].clone());

        v1.successors.set_head(v2.vnode().clone()).unwrap();
        v2.successors
            .replace(&[v3.vnode().clone(), v1.vnode().clone()])
            .unwrap();
        for vn in &vnodes {
            ctx.transport.register(vn.clone());
        }

        v1.notify_successor().await.unwrap();

        // v2's list came back [v3, v1]; v1 skips itself.
        let list = v1.successors.live().unwrap();
        assert_eq!(list, vec![v2.vnode().clone(), v3.vnode().clone()]);
        // And v2 adopted v1 as predecessor.
        assert_eq!(
            v2.lock_predecessor().unwrap().clone(),
            Some(v1.vnode().clone())
        );
    }
}
