//! Client RPC engine.
//!
//! Drives the request/response cycle against a 9P2000.L server in either
//! Single-RPC (one request in flight, serialized send+recv) or Multi-RPC
//! (tag-multiplexed, a dedicated reader task) mode. See the component design
//! in the crate root docs for the contract each mode must uphold.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;

use crate::error::{self, Error};
use crate::fcall::{Data, FCall, GetAttrMask, IOHDRSZ, MAXWELEM, Msg, MsgType, NOFID, NOTAG, P92000L, QId, SetAttr, SetAttrMask, Stat};
use crate::fidpool::FidPool;
use crate::tag::TagPool;
use crate::transport;

/// Client concurrency mode, chosen once at [`Client::start`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// One request in flight at a time; send and recv are serialized under
    /// a single lock. No reader task, no cancellation beyond abandoning the
    /// connection.
    Single,
    /// Tag-multiplexed. A dedicated reader task completes each caller's
    /// waiter by tag; writes are serialized under a mutex so frames never
    /// interleave on the wire.
    Multi,
}

type PendingMap = HashMap<u16, oneshot::Sender<Result<FCall, Error>>>;

struct Inner<S> {
    write: Mutex<WriteHalf<S>>,
    read: Mutex<Option<ReadHalf<S>>>,
    msize: u32,
    mode: Mode,
    tag_pool: Mutex<TagPool>,
    fid_pool: Mutex<FidPool>,
    pending: Arc<Mutex<PendingMap>>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
    /// Serializes send+recv for `Mode::Single`; unused in `Mode::Multi`.
    rpc_lock: Mutex<()>,
}

/// A connection to a 9P2000.L server.
///
/// Cheap to clone (an `Arc` handle); clones share the same transport, tag
/// pool and fid pool.
pub struct Client<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for Client<S> {
    fn clone(&self) -> Self {
        Client {
            inner: self.inner.clone(),
        }
    }
}

fn into_result(body: FCall) -> Result<FCall, Error> {
    match body {
        FCall::RlError { ecode } => Err(Error::Remote(nix::errno::Errno::from_raw(ecode as i32))),
        FCall::RError { ename } => Err(Error::Protocol(format!("legacy RError: {ename}"))),
        other => Ok(other),
    }
}

fn protocol_error(fcall: &FCall) -> Error {
    Error::Protocol(format!("unexpected response type {:?}", MsgType::from(fcall)))
}

fn eof_error() -> Error {
    Error::Transport(std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        "connection closed",
    ))
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Negotiate a connection: send `TVersion` on `NOTAG`, accept the
    /// server's msize (clamped to `msize_max`), and reject any version
    /// string other than `"9P2000.L"`. In `Mode::Multi`, spawns the reader
    /// task.
    pub async fn start(transport: S, msize_max: u32, mode: Mode) -> Result<Client<S>, Error> {
        let (mut read, mut write) = tokio::io::split(transport);

        let treq = Msg {
            tag: NOTAG,
            body: FCall::TVersion {
                msize: msize_max,
                version: P92000L.to_owned(),
            },
        };
        transport::write_msg(&mut write, &treq, msize_max).await?;
        let resp = transport::read_msg(&mut read, msize_max)
            .await?
            .ok_or_else(eof_error)?;
        if resp.tag != NOTAG {
            return Err(Error::Protocol(format!(
                "TVersion reply carried tag {} instead of NOTAG",
                resp.tag
            )));
        }
        let (msize, version) = match resp.body {
            FCall::RVersion { msize, version } => (msize, version),
            other => return Err(protocol_error(&other)),
        };
        if version != P92000L {
            return Err(Error::Protocol(format!(
                "server does not support 9P2000.L (replied {version})"
            )));
        }
        let msize = msize.min(msize_max);

        let pending: Arc<Mutex<PendingMap>> = Arc::new(Mutex::new(HashMap::new()));
        let inner = Arc::new(Inner {
            write: Mutex::new(write),
            read: Mutex::new(Some(read)),
            msize,
            mode,
            tag_pool: Mutex::new(TagPool::new()),
            fid_pool: Mutex::new(FidPool::new()),
            pending: pending.clone(),
            reader_task: Mutex::new(None),
            rpc_lock: Mutex::new(()),
        });

        if mode == Mode::Multi {
            let read = inner
                .read
                .lock()
                .await
                .take()
                .expect("read half present right after start");
            let handle = tokio::spawn(Self::reader_loop(read, msize, pending));
            *inner.reader_task.lock().await = Some(handle);
        }

        Ok(Client { inner })
    }

    async fn reader_loop(mut read: ReadHalf<S>, msize: u32, pending: Arc<Mutex<PendingMap>>) {
        loop {
            match transport::read_msg(&mut read, msize).await {
                Ok(Some(msg)) => {
                    if let Some(tx) = pending.lock().await.remove(&msg.tag) {
                        let _ = tx.send(into_result(msg.body));
                    }
                    // Unknown tag: either a flushed request's dropped stray
                    // reply, or a server bug. Either way, nobody is waiting.
                }
                Ok(None) => {
                    for (_, tx) in pending.lock().await.drain() {
                        let _ = tx.send(Err(Error::Canceled));
                    }
                    break;
                }
                Err(e) => {
                    log::error!("client reader: {e}");
                    for (_, tx) in pending.lock().await.drain() {
                        let _ = tx.send(Err(Error::Canceled));
                    }
                    break;
                }
            }
        }
    }

    /// Best-effort shutdown. Always succeeds: every pending call is woken
    /// with `Canceled` and the transport is closed.
    pub async fn finish(&self) {
        if let Some(handle) = self.inner.reader_task.lock().await.take() {
            handle.abort();
        }
        for (_, tx) in self.inner.pending.lock().await.drain() {
            let _ = tx.send(Err(Error::Canceled));
        }
        let mut write = self.inner.write.lock().await;
        let _ = write.shutdown().await;
    }

    async fn rpc(&self, body: FCall) -> Result<FCall, Error> {
        match self.inner.mode {
            Mode::Single => {
                let _guard = self.inner.rpc_lock.lock().await;
                let msg = Msg { tag: 0, body };
                {
                    let mut w = self.inner.write.lock().await;
                    transport::write_msg(&mut *w, &msg, self.inner.msize).await?;
                }
                let resp = {
                    let mut r = self.inner.read.lock().await;
                    let read = r.as_mut().expect("single-mode read half always present");
                    transport::read_msg(read, self.inner.msize).await?
                }
                .ok_or_else(eof_error)?;
                if resp.tag != msg.tag {
                    return Err(Error::Protocol(format!(
                        "tag mismatch: expected {}, got {}",
                        msg.tag, resp.tag
                    )));
                }
                into_result(resp.body)
            }
            Mode::Multi => {
                let tag = self
                    .inner
                    .tag_pool
                    .lock()
                    .await
                    .alloc()
                    .ok_or(Error::Alloc)?;
                let (tx, rx) = oneshot::channel();
                self.inner.pending.lock().await.insert(tag, tx);

                let msg = Msg { tag, body };
                let write_result = {
                    let mut w = self.inner.write.lock().await;
                    transport::write_msg(&mut *w, &msg, self.inner.msize).await
                };
                if let Err(e) = write_result {
                    self.inner.pending.lock().await.remove(&tag);
                    self.inner.tag_pool.lock().await.free(tag);
                    return Err(e);
                }

                let result = rx.await.unwrap_or(Err(Error::Canceled));
                self.inner.tag_pool.lock().await.free(tag);
                result
            }
        }
    }

    /// Issue `TFlush(oldtag)` on a fresh tag. On `RFlush`, releases the old
    /// tag's waiter (if still pending) with `Error::Canceled`; any reply
    /// that later arrives for `oldtag` is dropped silently by the reader
    /// task since nobody is waiting on it anymore.
    pub async fn flush(&self, oldtag: u16) -> Result<(), Error> {
        let resp = self.rpc(FCall::TFlush { oldtag }).await?;
        match resp {
            FCall::RFlush => {
                if let Some(tx) = self.inner.pending.lock().await.remove(&oldtag) {
                    let _ = tx.send(Err(Error::Canceled));
                }
                Ok(())
            }
            other => Err(protocol_error(&other)),
        }
    }

    /// Authenticate the connection. `Ok(None)` means the server doesn't
    /// require authentication (it answered `TAuth` with an error); any
    /// other error is a real failure. On success, `auth_fn` is handed the
    /// afid to drive whatever auth exchange the deployment needs (out of
    /// scope for this crate — only the AUTH/ATTACH shuttle is ours).
    pub async fn auth<F, Fut>(
        &self,
        uname: &str,
        aname: &str,
        n_uname: u32,
        auth_fn: F,
    ) -> Result<Option<Fid<S>>, Error>
    where
        F: FnOnce(&Fid<S>) -> Fut,
        Fut: std::future::Future<Output = Result<(), Error>>,
    {
        let afid_id = self.inner.fid_pool.lock().await.alloc().ok_or(Error::Alloc)?;
        let resp = self
            .rpc(FCall::TAuth {
                afid: afid_id,
                uname: uname.to_owned(),
                aname: aname.to_owned(),
                n_uname,
            })
            .await;

        match resp {
            Ok(FCall::RAuth { aqid: _ }) => {
                let afid = Fid::new(afid_id, self.inner.msize.saturating_sub(IOHDRSZ), self.clone());
                if let Err(e) = auth_fn(&afid).await {
                    // The callback failed its own handshake: the afid is
                    // useless, clunk it rather than leak the id.
                    let _ = self.clunk(afid).await;
                    return Err(e);
                }
                Ok(Some(afid))
            }
            Ok(other) => {
                self.inner.fid_pool.lock().await.free(afid_id);
                Err(protocol_error(&other))
            }
            Err(Error::Remote(_)) => {
                self.inner.fid_pool.lock().await.free(afid_id);
                Ok(None)
            }
            Err(e) => {
                self.inner.fid_pool.lock().await.free(afid_id);
                Err(e)
            }
        }
    }

    /// Attach to `aname` as `uname`, binding the new root fid. `afid` must
    /// be a fid previously returned by [`Client::auth`], or `None`.
    pub async fn attach(
        &self,
        afid: Option<&Fid<S>>,
        uname: &str,
        aname: &str,
        n_uname: u32,
    ) -> Result<Fid<S>, Error> {
        let fid_id = self.inner.fid_pool.lock().await.alloc().ok_or(Error::Alloc)?;
        let resp = self
            .rpc(FCall::TAttach {
                fid: fid_id,
                afid: afid.map(|f| f.id()).unwrap_or(NOFID),
                uname: uname.to_owned(),
                aname: aname.to_owned(),
                n_uname,
            })
            .await;

        match resp {
            Ok(FCall::RAttach { qid: _ }) => Ok(Fid::new(
                fid_id,
                self.inner.msize.saturating_sub(IOHDRSZ),
                self.clone(),
            )),
            Ok(other) => {
                self.inner.fid_pool.lock().await.free(fid_id);
                Err(protocol_error(&other))
            }
            Err(e) => {
                self.inner.fid_pool.lock().await.free(fid_id);
                Err(e)
            }
        }
    }

    /// Clunk a fid. The id always returns to the local pool, even if the
    /// server reports an error.
    pub async fn clunk(&self, fid: Fid<S>) -> Result<(), Error> {
        let id = fid.id();
        let resp = self.rpc(FCall::TClunk { fid: id }).await;
        self.inner.fid_pool.lock().await.free(id);
        match resp {
            Ok(FCall::RClunk) => Ok(()),
            Ok(other) => Err(protocol_error(&other)),
            Err(e) => Err(e),
        }
    }

    /// Walk `path` (`/`-delimited, leading `/` ignored) from `fid`,
    /// chunking into groups of at most [`MAXWELEM`] names. A chunk
    /// returning fewer qids than requested fails the whole walk with
    /// `ENOENT`, clunking the partially-allocated new fid first.
    pub async fn walk(&self, fid: &Fid<S>, path: &str) -> Result<Fid<S>, Error> {
        let components: Vec<&str> = path
            .trim_start_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        let newfid_id = self.inner.fid_pool.lock().await.alloc().ok_or(Error::Alloc)?;

        let chunks: Vec<&[&str]> = if components.is_empty() {
            vec![&[]]
        } else {
            components.chunks(MAXWELEM).collect()
        };

        let mut source = fid.id();
        for chunk in chunks {
            let n = chunk.len();
            let wnames: Vec<String> = chunk.iter().map(|s| s.to_string()).collect();
            let resp = self
                .rpc(FCall::TWalk {
                    fid: source,
                    newfid: newfid_id,
                    wnames,
                })
                .await;

            match resp {
                Ok(FCall::RWalk { wqids }) => {
                    if wqids.len() < n {
                        let _ = self.rpc(FCall::TClunk { fid: newfid_id }).await;
                        self.inner.fid_pool.lock().await.free(newfid_id);
                        return Err(Error::Remote(error::errno::ENOENT));
                    }
                    source = newfid_id;
                }
                Ok(other) => {
                    self.inner.fid_pool.lock().await.free(newfid_id);
                    return Err(protocol_error(&other));
                }
                Err(e) => {
                    self.inner.fid_pool.lock().await.free(newfid_id);
                    return Err(e);
                }
            }
        }

        Ok(Fid::new(newfid_id, fid.iounit(), self.clone()))
    }

    /// `TlOpen` — open `fid` with Linux open(2) flags, updating its iounit.
    pub async fn lopen(&self, fid: &Fid<S>, flags: u32) -> Result<QId, Error> {
        let resp = self.rpc(FCall::TlOpen { fid: fid.id(), flags }).await?;
        match resp {
            FCall::RlOpen { qid, iounit } => {
                fid.set_iounit(effective_iounit(iounit, self.inner.msize));
                Ok(qid)
            }
            other => Err(protocol_error(&other)),
        }
    }

    /// Alias for [`Client::lopen`], for callers that prefer the plain
    /// POSIX-ish name.
    pub async fn open(&self, fid: &Fid<S>, flags: u32) -> Result<QId, Error> {
        self.lopen(fid, flags).await
    }

    /// `TlCreate` — create `name` under directory `fid`; on success `fid`
    /// refers to the newly created file.
    pub async fn create(
        &self,
        fid: &Fid<S>,
        name: &str,
        flags: u32,
        mode: u32,
        gid: u32,
    ) -> Result<QId, Error> {
        let resp = self
            .rpc(FCall::TlCreate {
                fid: fid.id(),
                name: name.to_owned(),
                flags,
                mode,
                gid,
            })
            .await?;
        match resp {
            FCall::RlCreate { qid, iounit } => {
                fid.set_iounit(effective_iounit(iounit, self.inner.msize));
                Ok(qid)
            }
            other => Err(protocol_error(&other)),
        }
    }

    /// `TMkDir`.
    pub async fn mkdir(&self, fid: &Fid<S>, name: &str, mode: u32, gid: u32) -> Result<QId, Error> {
        let resp = self
            .rpc(FCall::TMkDir {
                dfid: fid.id(),
                name: name.to_owned(),
                mode,
                gid,
            })
            .await?;
        match resp {
            FCall::RMkDir { qid } => Ok(qid),
            other => Err(protocol_error(&other)),
        }
    }

    /// `TGetAttr`.
    pub async fn getattr(
        &self,
        fid: &Fid<S>,
        req_mask: GetAttrMask,
    ) -> Result<(GetAttrMask, QId, Stat), Error> {
        let resp = self
            .rpc(FCall::TGetAttr {
                fid: fid.id(),
                req_mask,
            })
            .await?;
        match resp {
            FCall::RGetAttr { valid, qid, stat } => Ok((valid, qid, stat)),
            other => Err(protocol_error(&other)),
        }
    }

    /// `TSetAttr`.
    pub async fn setattr(&self, fid: &Fid<S>, valid: SetAttrMask, stat: &SetAttr) -> Result<(), Error> {
        let resp = self
            .rpc(FCall::TSetAttr {
                fid: fid.id(),
                valid,
                stat: *stat,
            })
            .await?;
        match resp {
            FCall::RSetAttr => Ok(()),
            other => Err(protocol_error(&other)),
        }
    }

    /// Read at most `buf.len()` bytes at `offset`, clamped to
    /// `msize - IOHDRSZ`. A short return is not an error; the caller loops.
    pub async fn pread(&self, fid: &Fid<S>, buf: &mut [u8], offset: u64) -> Result<usize, Error> {
        let max = (self.inner.msize.saturating_sub(IOHDRSZ)) as usize;
        let count = buf.len().min(max) as u32;
        let resp = self
            .rpc(FCall::TRead {
                fid: fid.id(),
                offset,
                count,
            })
            .await?;
        match resp {
            FCall::RRead { data } => {
                let n = data.0.len().min(buf.len());
                buf[..n].copy_from_slice(&data.0[..n]);
                Ok(n)
            }
            other => Err(protocol_error(&other)),
        }
    }

    /// Write at most `buf.len()` bytes at `offset`, clamped the same way
    /// as [`Client::pread`].
    pub async fn pwrite(&self, fid: &Fid<S>, buf: &[u8], offset: u64) -> Result<usize, Error> {
        let max = (self.inner.msize.saturating_sub(IOHDRSZ)) as usize;
        let n = buf.len().min(max);
        let resp = self
            .rpc(FCall::TWrite {
                fid: fid.id(),
                offset,
                data: Data(buf[..n].to_vec()),
            })
            .await?;
        match resp {
            FCall::RWrite { count } => Ok(count as usize),
            other => Err(protocol_error(&other)),
        }
    }

    /// Read at `fid`'s local cursor, advancing it by the short-returned count.
    pub async fn read(&self, fid: &Fid<S>, buf: &mut [u8]) -> Result<usize, Error> {
        let off = fid.offset();
        let n = self.pread(fid, buf, off).await?;
        fid.advance(n as u64);
        Ok(n)
    }

    /// Write at `fid`'s local cursor, advancing it by the short-returned count.
    pub async fn write(&self, fid: &Fid<S>, buf: &[u8]) -> Result<usize, Error> {
        let off = fid.offset();
        let n = self.pwrite(fid, buf, off).await?;
        fid.advance(n as u64);
        Ok(n)
    }
}

fn effective_iounit(iounit: u32, msize: u32) -> u32 {
    if iounit != 0 {
        iounit
    } else {
        msize.saturating_sub(IOHDRSZ)
    }
}

/// Client-side fid: a 32-bit handle the caller uses to refer to a file or
/// directory. `offset` is a purely local cursor for the convenience
/// `read`/`write` helpers; it is never sent over the wire.
///
/// `lseek`-style `SEEK_END` is deliberately not provided: the cursor is a
/// local counter with no way to learn EOF without asking the server.
/// Callers that need true end-of-file positioning should call
/// [`Client::getattr`] and seek to the reported size, matching the
/// restriction the reference implementation this crate is descended from
/// already documents rather than silently changing the semantics.
pub struct Fid<S> {
    id: u32,
    iounit: AtomicU32,
    offset: AtomicU64,
    client: Client<S>,
}

impl<S> Fid<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn new(id: u32, iounit: u32, client: Client<S>) -> Fid<S> {
        Fid {
            id,
            iounit: AtomicU32::new(iounit),
            offset: AtomicU64::new(0),
            client,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn iounit(&self) -> u32 {
        self.iounit.load(Ordering::Relaxed)
    }

    fn set_iounit(&self, v: u32) {
        self.iounit.store(v, Ordering::Relaxed);
    }

    pub fn offset(&self) -> u64 {
        self.offset.load(Ordering::Relaxed)
    }

    /// Set the local read/write cursor. See the struct docs for why there
    /// is no `SEEK_END`.
    pub fn set_offset(&self, v: u64) {
        self.offset.store(v, Ordering::Relaxed);
    }

    fn advance(&self, n: u64) {
        self.offset.fetch_add(n, Ordering::Relaxed);
    }

    /// The client this fid belongs to.
    pub fn client(&self) -> &Client<S> {
        &self.client
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_iounit_falls_back_to_msize() {
        assert_eq!(effective_iounit(0, 8192), 8192 - IOHDRSZ);
        assert_eq!(effective_iounit(4096, 8192), 4096);
    }
}
