//! Synthetic, read-only control tree mounted at a dedicated `aname`.
//!
//! Every file's contents are generated lazily on first read and cached for
//! the lifetime of the fid that opened it — a second `TRead` on the same
//! fid never re-renders.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{self, errno};
use crate::fcall::{Data, DirEntry, DirEntryData, FCall, GetAttrMask, P92000L, QId, QIdType, Stat, Time};
use crate::srv::{FId, Filesystem};
use crate::utils::Result;

enum NodeKind {
    Dir(Vec<Arc<Node>>),
    File(Arc<dyn Fn() -> Vec<u8> + Send + Sync>),
}

/// One entry in the control tree: a directory or a file whose contents are
/// produced by a closure.
pub struct Node {
    name: String,
    qid: QId,
    kind: NodeKind,
}

impl Node {
    fn dir(name: &str, path: u64, children: Vec<Arc<Node>>) -> Arc<Node> {
        Arc::new(Node {
            name: name.to_owned(),
            qid: QId {
                typ: QIdType::DIR | QIdType::TMP,
                version: 0,
                path,
            },
            kind: NodeKind::Dir(children),
        })
    }

    fn file(name: &str, path: u64, render: impl Fn() -> Vec<u8> + Send + Sync + 'static) -> Arc<Node> {
        Arc::new(Node {
            name: name.to_owned(),
            qid: QId {
                typ: QIdType::TMP,
                version: 0,
                path,
            },
            kind: NodeKind::File(Arc::new(render)),
        })
    }

    fn children(&self) -> Option<&[Arc<Node>]> {
        match &self.kind {
            NodeKind::Dir(c) => Some(c),
            NodeKind::File(_) => None,
        }
    }

    fn render(&self) -> Vec<u8> {
        match &self.kind {
            NodeKind::File(f) => f(),
            NodeKind::Dir(_) => Vec::new(),
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Dir(_))
    }
}

/// Per-fid state: which node the fid is bound to, plus a cached render for
/// files. `Unbound` only exists between fid allocation and `rattach`/`rwalk`
/// actually binding it — no client operation should observe it.
#[derive(Default)]
pub enum CtlState {
    #[default]
    Unbound,
    Dir(Arc<Node>),
    File {
        node: Arc<Node>,
        cached: Option<Vec<u8>>,
    },
}

/// [`Filesystem::FId`] for [`CtlFs`]. A plain `Mutex` is enough: critical
/// sections never cross an await point.
pub type CtlFid = Mutex<CtlState>;

/// A small read-only filesystem exposing connection/build diagnostics,
/// meant to be attached under a dedicated `aname` (e.g. `"ctl"`) alongside
/// a deployment's real filesystem tree.
pub struct CtlFs {
    root: Arc<Node>,
    next_path: AtomicU64,
}

impl CtlFs {
    pub fn new() -> CtlFs {
        let next_path = AtomicU64::new(1);
        let alloc_path = || next_path.fetch_add(1, Ordering::Relaxed);

        let version = Node::file("version", alloc_path(), || format!("{P92000L}\n").into_bytes());
        let build = Node::file("build", alloc_path(), || {
            format!("{}\n", env!("CARGO_PKG_VERSION")).into_bytes()
        });
        let root = Node::dir("ctl", alloc_path(), vec![version, build]);

        CtlFs { root, next_path }
    }
}

impl Default for CtlFs {
    fn default() -> Self {
        Self::new()
    }
}

fn node_of(state: &CtlState) -> Result<Arc<Node>> {
    match state {
        CtlState::Dir(n) => Ok(n.clone()),
        CtlState::File { node, .. } => Ok(node.clone()),
        CtlState::Unbound => Err(error::Error::No(errno::EBADF)),
    }
}

#[async_trait]
impl Filesystem for CtlFs {
    type FId = CtlFid;

    async fn rattach(
        &self,
        fid: &FId<Self::FId>,
        _afid: Option<&FId<Self::FId>>,
        _uname: &str,
        _aname: &str,
        _n_uname: u32,
    ) -> Result<FCall> {
        let qid = self.root.qid;
        *fid.aux.lock().unwrap() = CtlState::Dir(self.root.clone());
        Ok(FCall::RAttach { qid })
    }

    async fn rwalk(
        &self,
        fid: &FId<Self::FId>,
        newfid: &FId<Self::FId>,
        wnames: &[String],
    ) -> Result<FCall> {
        let mut cur = node_of(&fid.aux.lock().unwrap())?;
        let mut qids = Vec::with_capacity(wnames.len());
        for name in wnames {
            let next = match cur.children().and_then(|c| c.iter().find(|n| &n.name == name)) {
                Some(n) => n.clone(),
                None => break,
            };
            qids.push(next.qid);
            cur = next;
        }

        *newfid.aux.lock().unwrap() = if cur.is_dir() {
            CtlState::Dir(cur)
        } else {
            CtlState::File { node: cur, cached: None }
        };

        Ok(FCall::RWalk { wqids: qids })
    }

    async fn rlopen(&self, fid: &FId<Self::FId>, _flags: u32) -> Result<FCall> {
        let node = node_of(&fid.aux.lock().unwrap())?;
        Ok(FCall::RlOpen {
            qid: node.qid,
            iounit: 0,
        })
    }

    async fn rread(&self, fid: &FId<Self::FId>, offset: u64, count: u32) -> Result<FCall> {
        let mut guard = fid.aux.lock().unwrap();
        let bytes = match &mut *guard {
            CtlState::File { node, cached } => {
                if cached.is_none() {
                    *cached = Some(node.render());
                }
                cached.as_ref().unwrap().clone()
            }
            CtlState::Dir(_) => return Err(error::Error::No(errno::EISDIR)),
            CtlState::Unbound => return Err(error::Error::No(errno::EBADF)),
        };
        drop(guard);

        let start = (offset as usize).min(bytes.len());
        let end = start.saturating_add(count as usize).min(bytes.len());
        Ok(FCall::RRead {
            data: Data(bytes[start..end].to_vec()),
        })
    }

    async fn rreaddir(&self, fid: &FId<Self::FId>, offset: u64, count: u32) -> Result<FCall> {
        let node = match &*fid.aux.lock().unwrap() {
            CtlState::Dir(n) => n.clone(),
            CtlState::File { .. } => return Err(error::Error::No(errno::ENOTDIR)),
            CtlState::Unbound => return Err(error::Error::No(errno::EBADF)),
        };

        let children = node.children().unwrap_or(&[]);
        let mut data = DirEntryData::new();
        let mut total = 0u32;
        for (i, child) in children.iter().enumerate().skip(offset as usize) {
            // Linux `d_type` values: DT_DIR = 4, DT_REG = 8.
            let entry = DirEntry {
                qid: child.qid,
                offset: (i + 1) as u64,
                typ: if child.is_dir() { 4 } else { 8 },
                name: child.name.clone(),
            };
            let size = entry.size();
            if total + size > count {
                break;
            }
            total += size;
            data.push(entry);
        }
        Ok(FCall::RReadDir { data })
    }

    async fn rgetattr(&self, fid: &FId<Self::FId>, req_mask: GetAttrMask) -> Result<FCall> {
        let (node, size) = match &*fid.aux.lock().unwrap() {
            CtlState::Dir(n) => (n.clone(), 0u64),
            CtlState::File { node, cached } => (
                node.clone(),
                cached.as_ref().map(|b| b.len() as u64).unwrap_or(0),
            ),
            CtlState::Unbound => return Err(error::Error::No(errno::EBADF)),
        };

        let mode = if node.is_dir() { 0o040_555 } else { 0o100_444 };
        let zero = Time { sec: 0, nsec: 0 };
        let stat = Stat {
            mode,
            uid: 0,
            gid: 0,
            nlink: 1,
            rdev: 0,
            size,
            blksize: 4096,
            blocks: 0,
            atime: zero,
            mtime: zero,
            ctime: zero,
        };
        Ok(FCall::RGetAttr {
            valid: req_mask,
            qid: node.qid,
            stat,
        })
    }

    async fn rclunk(&self, _fid: &FId<Self::FId>) -> Result<FCall> {
        Ok(FCall::RClunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fid_with(state: CtlState) -> FId<CtlFid> {
        FId::new(0, Mutex::new(state))
    }

    #[tokio::test]
    async fn version_file_round_trips() {
        let fs = CtlFs::new();
        let root_fid = fid_with(CtlState::Unbound);
        fs.rattach(&root_fid, None, "nobody", "ctl", crate::fcall::NONUNAME)
            .await
            .unwrap();

        let leaf_fid = fid_with(CtlState::Unbound);
        let resp = fs
            .rwalk(&root_fid, &leaf_fid, &["version".to_owned()])
            .await
            .unwrap();
        match resp {
            FCall::RWalk { wqids } => assert_eq!(wqids.len(), 1),
            _ => panic!("expected RWalk"),
        }

        let resp = fs.rread(&leaf_fid, 0, 4096).await.unwrap();
        match resp {
            FCall::RRead { data } => assert_eq!(data.0, format!("{P92000L}\n").into_bytes()),
            _ => panic!("expected RRead"),
        }
    }

    #[tokio::test]
    async fn walk_past_the_tree_is_partial() {
        let fs = CtlFs::new();
        let root_fid = fid_with(CtlState::Unbound);
        fs.rattach(&root_fid, None, "nobody", "ctl", crate::fcall::NONUNAME)
            .await
            .unwrap();

        let leaf_fid = fid_with(CtlState::Unbound);
        let resp = fs
            .rwalk(&root_fid, &leaf_fid, &["nonexistent".to_owned()])
            .await
            .unwrap();
        match resp {
            FCall::RWalk { wqids } => assert!(wqids.is_empty()),
            _ => panic!("expected RWalk"),
        }
    }
}
