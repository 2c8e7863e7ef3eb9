//! Circular byte buffers connecting exactly one producing and one consuming
//! component.
//!
//! A [`RingBuffer`] owns its storage plus the four accounting fields
//! (`r_ptr`, `w_ptr`, `avail`, `free`). Cursors are byte offsets into the
//! storage, so `addr` is always `0` and `end_addr` is always [`size`](RingBuffer::size).
//! The invariant `avail + free == size` holds at every observable point.
//!
//! # Concurrency
//!
//! The producer and consumer may run on different cores. Every mutation of the
//! accounting fields happens inside one short critical section (a
//! `parking_lot::Mutex`), and the registered event callback runs *inside* that
//! same section. Callbacks must therefore be bounded in cost: no blocking, no
//! allocation, no re-entry into the buffer.
//!
//! # Full vs. empty
//!
//! When `r_ptr == w_ptr` the buffer is either completely full or completely
//! empty. Which one is decided solely by the operation that produced the
//! equality: after [`produce`](RingBuffer::produce) it means full, after
//! [`consume`](RingBuffer::consume) it means empty. No extra state bit is kept,
//! so [`reset`](RingBuffer::reset) and [`set_size`](RingBuffer::set_size) are
//! the only other places that establish "empty".

pub mod pool;

use core::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::component::ComponentId;
use crate::error::{Error, Result};

pub use pool::{HeapPool, MemCaps, MemoryPool, UnboundedPool};

/// Largest storage size a single buffer may request, in bytes.
pub const MAX_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// Bytes charged to the RAM zone for each buffer control block.
const CONTROL_BLOCK_BYTES: usize = core::mem::size_of::<RingBuffer>();

/// Unique identifier for a buffer in the graph registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

impl BufferId {
    /// Returns the raw numeric identifier.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BufferId({})", self.0)
    }
}

/// Set of buffer events a callback is registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferEvents(u8);

impl BufferEvents {
    /// Fired after bytes are produced.
    pub const PRODUCE: Self = Self(1 << 0);
    /// Fired after bytes are consumed.
    pub const CONSUME: Self = Self(1 << 1);
    /// Fired once when the buffer is released.
    pub const FREE: Self = Self(1 << 2);
    /// All events.
    pub const ALL: Self = Self(0b111);

    /// Returns `true` if all bits in `other` are set in `self`.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns the union of two event sets.
    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// The event a [`BufferTransaction`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferEvent {
    /// `produce()` advanced the write cursor.
    Produce,
    /// `consume()` advanced the read cursor.
    Consume,
    /// The buffer is being released.
    Free,
}

impl BufferEvent {
    fn mask(self) -> BufferEvents {
        match self {
            Self::Produce => BufferEvents::PRODUCE,
            Self::Consume => BufferEvents::CONSUME,
            Self::Free => BufferEvents::FREE,
        }
    }
}

/// Details handed to a buffer callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferTransaction {
    /// Buffer the event happened on.
    pub buffer: BufferId,
    /// What happened.
    pub event: BufferEvent,
    /// Number of bytes moved (`0` for [`BufferEvent::Free`]).
    pub bytes: usize,
    /// Cursor offset at which the transaction began.
    pub begin: usize,
}

/// Callback invoked inside the buffer's critical section.
pub type BufferCallback = Box<dyn Fn(&BufferTransaction) + Send + Sync>;

/// Behaviour switches for xrun-tolerant endpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferFlags {
    /// Report a drained buffer as full so readers never see an underrun.
    pub underrun_permitted: bool,
    /// Report a full buffer as empty so writers never see an overrun.
    pub overrun_permitted: bool,
}

/// Audio stream parameters attached to a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamParams {
    /// Sample rate in Hz.
    pub rate: u32,
    /// Interleaved channel count.
    pub channels: u32,
    /// Bytes per sample container.
    pub sample_bytes: u32,
}

impl StreamParams {
    /// Bytes per interleaved frame.
    #[inline]
    pub fn frame_bytes(&self) -> usize {
        (self.channels * self.sample_bytes) as usize
    }

    /// Bytes produced by one period of `period_us` microseconds.
    pub fn period_bytes(&self, period_us: u32) -> usize {
        let frames = u64::from(self.rate) * u64::from(period_us) / 1_000_000;
        frames as usize * self.frame_bytes()
    }
}

impl Default for StreamParams {
    fn default() -> Self {
        Self {
            rate: 48000,
            channels: 2,
            sample_bytes: 4,
        }
    }
}

/// Consistent view of the accounting fields, taken under the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSnapshot {
    /// Capacity in bytes.
    pub size: usize,
    /// Read cursor offset.
    pub r_ptr: usize,
    /// Write cursor offset.
    pub w_ptr: usize,
    /// Bytes available to the consumer.
    pub avail: usize,
    /// Bytes free for the producer.
    pub free: usize,
}

struct Stream {
    data: Vec<u8>,
    r_ptr: usize,
    w_ptr: usize,
    avail: usize,
    free: usize,
    params: Option<StreamParams>,
}

impl Stream {
    fn new(size: usize) -> Self {
        Self {
            data: vec![0; size],
            r_ptr: 0,
            w_ptr: 0,
            avail: 0,
            free: size,
            params: None,
        }
    }

    #[inline]
    fn size(&self) -> usize {
        self.data.len()
    }

    fn rewind(&mut self) {
        self.r_ptr = 0;
        self.w_ptr = 0;
        self.avail = 0;
        self.free = self.size();
    }

    /// Recomputes `avail`/`free` from the cursors. `equal_is_full` picks the
    /// meaning of `r_ptr == w_ptr`.
    fn recount(&mut self, equal_is_full: bool) {
        let size = self.size();
        self.avail = if self.r_ptr < self.w_ptr {
            self.w_ptr - self.r_ptr
        } else if self.r_ptr == self.w_ptr {
            if equal_is_full { size } else { 0 }
        } else {
            size - (self.r_ptr - self.w_ptr)
        };
        self.free = size - self.avail;
    }

    fn avail_bytes(&self, flags: BufferFlags) -> usize {
        if flags.underrun_permitted && self.avail == 0 {
            self.size()
        } else {
            self.avail
        }
    }

    fn free_bytes(&self, flags: BufferFlags) -> usize {
        if flags.overrun_permitted && self.free == 0 {
            self.size()
        } else {
            self.free
        }
    }
}

/// Fixed-capacity circular byte buffer.
pub struct RingBuffer {
    id: BufferId,
    caps: MemCaps,
    align: usize,
    flags: BufferFlags,
    pub(crate) source: Option<ComponentId>,
    pub(crate) sink: Option<ComponentId>,
    stream: Mutex<Stream>,
    callback: Option<(BufferEvents, BufferCallback)>,
    pool: Arc<dyn MemoryPool>,
}

impl RingBuffer {
    /// Allocates a buffer of `size` bytes from `pool`.
    ///
    /// The control block is charged to the RAM zone first, then the storage
    /// to the zone matching `caps`. If the storage cannot be reserved the
    /// control block is returned and the call fails with
    /// [`Error::OutOfMemory`].
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] when `size` is zero, exceeds
    /// [`MAX_BUFFER_SIZE`], or `align` is neither zero nor a power of two.
    pub fn alloc(
        id: BufferId,
        size: usize,
        caps: MemCaps,
        align: usize,
        pool: Arc<dyn MemoryPool>,
    ) -> Result<Self> {
        if size == 0 || size > MAX_BUFFER_SIZE {
            tracing::error!("buffer_alloc: new size = {size} is invalid");
            return Err(Error::InvalidArgument);
        }
        if align != 0 && !align.is_power_of_two() {
            tracing::error!("buffer_alloc: alignment {align} is not a power of two");
            return Err(Error::InvalidArgument);
        }

        pool.reserve(MemCaps::RAM, CONTROL_BLOCK_BYTES)?;
        if pool.reserve(caps, size).is_err() {
            tracing::error!(
                "buffer_alloc: could not alloc size = {size} bytes of caps = {:#x}",
                caps.bits()
            );
            pool.release(MemCaps::RAM, CONTROL_BLOCK_BYTES);
            return Err(Error::OutOfMemory);
        }

        tracing::debug!("buffer_alloc: {id} size {size}");
        Ok(Self {
            id,
            caps,
            align,
            flags: BufferFlags::default(),
            source: None,
            sink: None,
            stream: Mutex::new(Stream::new(size)),
            callback: None,
            pool,
        })
    }

    /// Allocates the largest size between `minimum` and `preferred` the pool
    /// can serve.
    ///
    /// `preferred` is first rounded up to a multiple of `minimum`, then sizes
    /// are tried from the top down in steps of `minimum`.
    pub fn alloc_range(
        id: BufferId,
        preferred: usize,
        minimum: usize,
        caps: MemCaps,
        align: usize,
        pool: Arc<dyn MemoryPool>,
    ) -> Result<Self> {
        if minimum == 0 || preferred < minimum {
            tracing::error!("buffer_alloc_range: new size range {minimum} -- {preferred} is invalid");
            return Err(Error::InvalidArgument);
        }
        let preferred = round_up(preferred, minimum).min(MAX_BUFFER_SIZE.max(minimum));

        let mut size = preferred;
        while size >= minimum {
            match Self::alloc(id, size, caps, align, Arc::clone(&pool)) {
                Ok(buffer) => {
                    tracing::debug!("buffer_alloc_range: allocated {size} bytes");
                    return Ok(buffer);
                }
                Err(Error::OutOfMemory) => size -= minimum,
                Err(err) => return Err(err),
            }
        }
        tracing::error!("buffer_alloc_range: could not alloc size = {minimum} bytes");
        Err(Error::OutOfMemory)
    }

    /// Buffer identifier.
    #[inline]
    pub fn id(&self) -> BufferId {
        self.id
    }

    /// Capability class the storage was carved from.
    #[inline]
    pub fn caps(&self) -> MemCaps {
        self.caps
    }

    /// Requested storage alignment (`0` = none).
    #[inline]
    pub fn align(&self) -> usize {
        self.align
    }

    /// Producing component, if wired.
    #[inline]
    pub fn source(&self) -> Option<ComponentId> {
        self.source
    }

    /// Consuming component, if wired.
    #[inline]
    pub fn sink(&self) -> Option<ComponentId> {
        self.sink
    }

    /// Xrun-tolerance flags.
    #[inline]
    pub fn flags(&self) -> BufferFlags {
        self.flags
    }

    /// Replaces the xrun-tolerance flags.
    pub fn set_flags(&mut self, flags: BufferFlags) {
        self.flags = flags;
    }

    /// Registers `callback` for the events in `events`, replacing any
    /// previous registration.
    ///
    /// The callback runs inside the buffer's critical section and must be
    /// bounded in cost.
    pub fn set_callback(&mut self, events: BufferEvents, callback: BufferCallback) {
        self.callback = Some((events, callback));
    }

    /// Removes the registered callback.
    pub fn clear_callback(&mut self) {
        self.callback = None;
    }

    /// Capacity in bytes.
    pub fn size(&self) -> usize {
        self.stream.lock().size()
    }

    /// Raw bytes available to the consumer.
    pub fn avail(&self) -> usize {
        self.stream.lock().avail
    }

    /// Raw bytes free for the producer.
    pub fn free(&self) -> usize {
        self.stream.lock().free
    }

    /// Bytes available, honouring [`BufferFlags::underrun_permitted`].
    pub fn avail_bytes(&self) -> usize {
        self.stream.lock().avail_bytes(self.flags)
    }

    /// Free bytes, honouring [`BufferFlags::overrun_permitted`].
    pub fn free_bytes(&self) -> usize {
        self.stream.lock().free_bytes(self.flags)
    }

    /// Read cursor offset.
    pub fn r_ptr(&self) -> usize {
        self.stream.lock().r_ptr
    }

    /// Write cursor offset.
    pub fn w_ptr(&self) -> usize {
        self.stream.lock().w_ptr
    }

    /// Consistent snapshot of all accounting fields.
    pub fn snapshot(&self) -> BufferSnapshot {
        let s = self.stream.lock();
        BufferSnapshot {
            size: s.size(),
            r_ptr: s.r_ptr,
            w_ptr: s.w_ptr,
            avail: s.avail,
            free: s.free,
        }
    }

    /// Stream parameters, once negotiated.
    pub fn params(&self) -> Option<StreamParams> {
        self.stream.lock().params
    }

    /// Attaches stream parameters used for frame accounting.
    pub fn set_params(&self, params: StreamParams) {
        self.stream.lock().params = Some(params);
    }

    /// Whole frames available, or `0` before params are set.
    pub fn avail_frames(&self) -> usize {
        let s = self.stream.lock();
        match s.params {
            Some(p) if p.frame_bytes() > 0 => s.avail_bytes(self.flags) / p.frame_bytes(),
            _ => 0,
        }
    }

    /// Whole frames free, or `0` before params are set.
    pub fn free_frames(&self) -> usize {
        let s = self.stream.lock();
        match s.params {
            Some(p) if p.frame_bytes() > 0 => s.free_bytes(self.flags) / p.frame_bytes(),
            _ => 0,
        }
    }

    /// Marks `bytes` as written at the write cursor.
    ///
    /// Producing more than the free space overwrites the oldest unread data:
    /// the read cursor is dragged along to the new write cursor and the buffer
    /// reads as full. This is not an error.
    pub fn produce(&self, bytes: usize) {
        if bytes == 0 {
            tracing::trace!("comp_update_buffer_produce: {} no bytes to produce", self.id);
            return;
        }

        let mut s = self.stream.lock();
        let begin = s.w_ptr;
        let free = s.free_bytes(self.flags);
        s.w_ptr = (s.w_ptr + bytes) % s.size();
        if bytes > free {
            s.r_ptr = s.w_ptr;
        }
        s.recount(true);
        self.notify(BufferEvent::Produce, bytes, begin);
    }

    /// Marks `bytes` as read at the read cursor.
    pub fn consume(&self, bytes: usize) {
        if bytes == 0 {
            tracing::trace!("comp_update_buffer_consume: {} no bytes to consume", self.id);
            return;
        }

        let mut s = self.stream.lock();
        let begin = s.r_ptr;
        s.r_ptr = (s.r_ptr + bytes) % s.size();
        s.recount(false);
        self.notify(BufferEvent::Consume, bytes, begin);
    }

    /// Copies `src` into storage starting at the write cursor, wrapping at
    /// the end. Cursors do not move; call [`produce`](Self::produce) after.
    ///
    /// Returns the number of bytes copied (at most [`size`](Self::size)).
    pub fn write(&self, src: &[u8]) -> usize {
        let mut s = self.stream.lock();
        let size = s.size();
        let len = src.len().min(size);
        let start = s.w_ptr;
        let first = len.min(size - start);
        s.data[start..start + first].copy_from_slice(&src[..first]);
        s.data[..len - first].copy_from_slice(&src[first..len]);
        len
    }

    /// Copies up to `out.len()` available bytes starting at the read cursor.
    /// Cursors do not move; call [`consume`](Self::consume) after.
    pub fn read(&self, out: &mut [u8]) -> usize {
        let s = self.stream.lock();
        let size = s.size();
        let len = out.len().min(s.avail);
        let start = s.r_ptr;
        let first = len.min(size - start);
        out[..first].copy_from_slice(&s.data[start..start + first]);
        out[first..len].copy_from_slice(&s.data[..len - first]);
        len
    }

    /// Fills the storage with zeros without touching the cursors.
    pub fn zero(&self) {
        self.stream.lock().data.fill(0);
    }

    /// Rewinds both cursors and clears the storage: the buffer becomes empty.
    pub fn reset(&self) {
        let mut s = self.stream.lock();
        s.data.fill(0);
        s.rewind();
    }

    /// Resizes the storage in place. The buffer comes back empty.
    ///
    /// Shrinking always succeeds. A failed grow returns
    /// [`Error::OutOfMemory`] and leaves the buffer at its old size.
    pub fn set_size(&self, size: usize) -> Result<()> {
        if size == 0 || size > MAX_BUFFER_SIZE {
            tracing::error!("{}: resize size = {size} is invalid", self.id);
            return Err(Error::InvalidArgument);
        }

        let mut s = self.stream.lock();
        let old = s.size();
        if size == old {
            return Ok(());
        }
        if self.pool.resize(self.caps, old, size).is_err() {
            tracing::error!("{}: resize can't alloc {size} bytes", self.id);
            return Err(Error::OutOfMemory);
        }
        s.data = vec![0; size];
        s.rewind();
        tracing::debug!("{}: resized {old} -> {size}", self.id);
        Ok(())
    }

    /// Resizes to the largest size between `minimum` and `preferred` the
    /// pool can serve, stepping down in multiples of `minimum`.
    pub fn set_size_range(&self, preferred: usize, minimum: usize) -> Result<()> {
        if minimum == 0 || preferred < minimum {
            tracing::error!("{}: resize size range {minimum} -- {preferred} is invalid", self.id);
            return Err(Error::InvalidArgument);
        }
        let preferred = round_up(preferred, minimum);
        if preferred == self.size() {
            return Ok(());
        }

        let mut size = preferred;
        while size >= minimum {
            match self.set_size(size) {
                Ok(()) => return Ok(()),
                Err(Error::OutOfMemory) => size -= minimum,
                Err(err) => return Err(err),
            }
        }
        Err(Error::OutOfMemory)
    }

    fn notify(&self, event: BufferEvent, bytes: usize, begin: usize) {
        if let Some((events, callback)) = &self.callback
            && events.contains(event.mask())
        {
            callback(&BufferTransaction {
                buffer: self.id,
                event,
                bytes,
                begin,
            });
        }
    }
}

impl Drop for RingBuffer {
    fn drop(&mut self) {
        let size = {
            let s = self.stream.lock();
            self.notify(BufferEvent::Free, 0, s.r_ptr);
            s.size()
        };
        self.pool.release(self.caps, size);
        self.pool.release(MemCaps::RAM, CONTROL_BLOCK_BYTES);
        tracing::debug!("buffer_free: {}", self.id);
    }
}

impl fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snap = self.snapshot();
        f.debug_struct("RingBuffer")
            .field("id", &self.id)
            .field("source", &self.source)
            .field("sink", &self.sink)
            .field("snapshot", &snap)
            .finish_non_exhaustive()
    }
}

/// Bytes that can move from `source` to `sink` in one step: the smaller of
/// the source's available bytes and the sink's free bytes.
pub fn copy_bytes(source: &RingBuffer, sink: &RingBuffer) -> usize {
    source.avail_bytes().min(sink.free_bytes())
}

fn round_up(value: usize, multiple: usize) -> usize {
    match value % multiple {
        0 => value,
        rem => value + multiple - rem,
    }
}
