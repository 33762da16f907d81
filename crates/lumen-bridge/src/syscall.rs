//! WASI preview1 subset.
//!
//! Guests built against a libc for `wasm32-wasi` import a handful of
//! `wasi_snapshot_preview1` functions during startup and for `printf`. The
//! [`SyscallShim`] answers those: console output, a monotonic clock, empty
//! argument and environment vectors, random bytes, and fixed error codes for
//! everything that would need a filesystem.
//!
//! | Group | Behaviour |
//! |-------|-----------|
//! | `fd_write` | fd 1/2 to the [`Console`], other fds discarded |
//! | `args_*`, `environ_*` | empty |
//! | `clock_time_get` | nanoseconds since the shim was created |
//! | `fd_prestat_*` | no preopened directories |
//! | `path_*`, `fd_readdir` | `ENOSYS` |
//! | `proc_exit` | one-way, see [`ProcExit`] |

use std::time::Instant;

use rand::RngCore;

use crate::console::{Console, ConsoleStream};
use crate::error::Result;
use crate::memory::{GuestPtr, MemoryView};

/// WASI error numbers returned by the shim.
pub mod errno {
    /// No error
    pub const SUCCESS: i32 = 0;
    /// Bad file descriptor
    pub const BADF: i32 = 8;
    /// Invalid argument
    pub const INVAL: i32 = 28;
    /// Function not supported
    pub const NOSYS: i32 = 52;
}

const FILETYPE_CHARACTER_DEVICE: u8 = 2;
const RIGHT_FD_READ: u64 = 1 << 1;
const RIGHT_FD_FDSTAT_SET_FLAGS: u64 = 1 << 3;
const RIGHT_FD_WRITE: u64 = 1 << 6;
const RIGHT_POLL_FD_READWRITE: u64 = 1 << 27;

/// Size of a WASI `fdstat` record.
const FDSTAT_SIZE: usize = 24;

/// The guest called `proc_exit`.
///
/// Raised as the trap payload so the call never returns into the guest; the
/// runtime turns it into a normal exit with this status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("guest exited with status {0}")]
pub struct ProcExit(pub i32);

/// Host side of the `wasi_snapshot_preview1` imports.
pub struct SyscallShim {
    console: Box<dyn Console>,
    epoch: Instant,
}

impl SyscallShim {
    /// Route console output to `console`. The clock starts now.
    pub fn new(console: impl Console + 'static) -> Self {
        Self {
            console: Box::new(console),
            epoch: Instant::now(),
        }
    }

    /// `args_get`: there are no arguments.
    pub fn args_get(&self) -> i32 {
        errno::SUCCESS
    }

    /// `args_sizes_get`
    pub fn args_sizes_get(
        &self,
        mem: &mut MemoryView<'_>,
        argc: GuestPtr,
        argv_buf_size: GuestPtr,
    ) -> Result<i32> {
        mem.write_u32(argc, 0)?;
        mem.write_u32(argv_buf_size, 0)?;
        Ok(errno::SUCCESS)
    }

    /// `environ_get`: the environment is empty.
    pub fn environ_get(&self) -> i32 {
        errno::SUCCESS
    }

    /// `environ_sizes_get`
    pub fn environ_sizes_get(
        &self,
        mem: &mut MemoryView<'_>,
        count: GuestPtr,
        buf_size: GuestPtr,
    ) -> Result<i32> {
        mem.write_u32(count, 0)?;
        mem.write_u32(buf_size, 0)?;
        Ok(errno::SUCCESS)
    }

    /// `clock_time_get`: every clock id reads the same monotonic clock.
    pub fn clock_time_get(
        &self,
        mem: &mut MemoryView<'_>,
        _id: u32,
        _precision: u64,
        time_out: GuestPtr,
    ) -> Result<i32> {
        let nanos = u64::try_from(self.epoch.elapsed().as_nanos()).unwrap_or(u64::MAX);
        mem.write_u64(time_out, nanos)?;
        Ok(errno::SUCCESS)
    }

    /// `fd_write`: gathers the iovecs and emits them as one console write.
    pub fn fd_write(
        &mut self,
        mem: &mut MemoryView<'_>,
        fd: u32,
        iovs: GuestPtr,
        iovs_len: u32,
        nwritten: GuestPtr,
    ) -> Result<i32> {
        let mut text = String::new();
        let mut written: u32 = 0;
        for i in 0..iovs_len {
            let iov = iovs.wrapping_add(8 * i);
            let buf = mem.read_u32(iov)?;
            let len = mem.read_u32(iov.wrapping_add(4))?;
            text.extend(mem.slice(buf, len as usize)?.iter().map(|&b| b as char));
            written = written.wrapping_add(len);
        }

        match ConsoleStream::from_fd(fd) {
            Some(stream) => {
                tracing::trace!(fd, bytes = written, "console write");
                self.console.write(stream, &text);
            }
            None => tracing::debug!(fd, bytes = written, "discarding write to non-console fd"),
        }

        mem.write_u32(nwritten, written)?;
        Ok(errno::SUCCESS)
    }

    /// `fd_read`: always end of file.
    pub fn fd_read(
        &self,
        mem: &mut MemoryView<'_>,
        _fd: u32,
        _iovs: GuestPtr,
        _iovs_len: u32,
        nread: GuestPtr,
    ) -> Result<i32> {
        mem.write_u32(nread, 0)?;
        Ok(errno::SUCCESS)
    }

    /// `fd_close`
    pub fn fd_close(&self, _fd: u32) -> i32 {
        errno::SUCCESS
    }

    /// `fd_fdstat_get`: stdio are character devices, nothing else exists.
    pub fn fd_fdstat_get(&self, mem: &mut MemoryView<'_>, fd: u32, stat: GuestPtr) -> Result<i32> {
        if fd > 2 {
            return Ok(errno::BADF);
        }
        let rights =
            RIGHT_FD_READ | RIGHT_FD_WRITE | RIGHT_FD_FDSTAT_SET_FLAGS | RIGHT_POLL_FD_READWRITE;
        mem.copy_in(stat, &[0u8; FDSTAT_SIZE])?;
        mem.copy_in(stat, &[FILETYPE_CHARACTER_DEVICE])?;
        mem.write_u64(stat.wrapping_add(8), rights)?;
        mem.write_u64(stat.wrapping_add(16), rights)?;
        Ok(errno::SUCCESS)
    }

    /// `fd_fdstat_set_flags`
    pub fn fd_fdstat_set_flags(&self, _fd: u32, _flags: u32) -> i32 {
        errno::SUCCESS
    }

    /// `fd_prestat_get`: there are no preopened directories.
    pub fn fd_prestat_get(&self, _fd: u32, _buf: GuestPtr) -> i32 {
        errno::BADF
    }

    /// `fd_prestat_dir_name`
    pub fn fd_prestat_dir_name(&self, _fd: u32, _path: GuestPtr, _len: u32) -> i32 {
        errno::INVAL
    }

    /// `fd_seek`: reports offset 0.
    pub fn fd_seek(
        &self,
        mem: &mut MemoryView<'_>,
        _fd: u32,
        _offset: i64,
        _whence: u32,
        newoffset: GuestPtr,
    ) -> Result<i32> {
        mem.write_u64(newoffset, 0)?;
        Ok(errno::SUCCESS)
    }

    /// `fd_readdir`, `path_create_directory`, `path_open`, `path_readlink`.
    pub fn unsupported(&self, call: &'static str) -> i32 {
        tracing::debug!(call, "filesystem call not supported");
        errno::NOSYS
    }

    /// `poll_oneoff`: no events ever fire.
    pub fn poll_oneoff(
        &self,
        mem: &mut MemoryView<'_>,
        _subscriptions: GuestPtr,
        _events: GuestPtr,
        _nsubscriptions: u32,
        nevents: GuestPtr,
    ) -> Result<i32> {
        mem.write_u32(nevents, 0)?;
        Ok(errno::SUCCESS)
    }

    /// `random_get`
    pub fn random_get(&self, mem: &mut MemoryView<'_>, buf: GuestPtr, len: u32) -> Result<i32> {
        rand::thread_rng().fill_bytes(mem.slice_mut(buf, len as usize)?);
        Ok(errno::SUCCESS)
    }

    /// `proc_exit`: never returns to the guest.
    pub fn proc_exit(&self, code: i32) -> ProcExit {
        tracing::debug!(code, "guest called proc_exit");
        ProcExit(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::MemoryConsole;
    use crate::error::BridgeError;

    fn shim() -> (SyscallShim, MemoryConsole) {
        let console = MemoryConsole::new();
        (SyscallShim::new(console.clone()), console)
    }

    #[test]
    fn test_fd_write_concatenates_iovecs() {
        let (mut wasi, console) = shim();
        let mut buf = vec![0u8; 256];
        let mut mem = MemoryView::new(&mut buf);

        mem.copy_in(100, b"Hello, ").unwrap();
        mem.copy_in(120, b"world\n").unwrap();
        // iovec[0] = {100, 7}, iovec[1] = {120, 6}
        for (i, v) in [100u32, 7, 120, 6].into_iter().enumerate() {
            mem.write_u32(16 + 4 * i as u32, v).unwrap();
        }

        let rc = wasi.fd_write(&mut mem, 1, 16, 2, 40).unwrap();
        assert_eq!(rc, errno::SUCCESS);
        assert_eq!(mem.read_u32(40).unwrap(), 13);
        assert_eq!(console.stdout(), "Hello, world\n");
        assert_eq!(console.stderr(), "");
    }

    #[test]
    fn test_fd_write_routes_by_descriptor() {
        let (mut wasi, console) = shim();
        let mut buf = vec![0u8; 128];
        let mut mem = MemoryView::new(&mut buf);

        mem.copy_in(64, &[b'e', b'r', b'r', 0xE9]).unwrap();
        mem.write_u32(0, 64).unwrap();
        mem.write_u32(4, 4).unwrap();

        wasi.fd_write(&mut mem, 2, 0, 1, 8).unwrap();
        wasi.fd_write(&mut mem, 7, 0, 1, 12).unwrap();

        assert_eq!(console.stderr(), "err\u{e9}");
        assert_eq!(console.stdout(), "");
        // Discarded writes still report their length
        assert_eq!(mem.read_u32(12).unwrap(), 4);
    }

    #[test]
    fn test_fd_write_out_of_bounds_iovec() {
        let (mut wasi, console) = shim();
        let mut buf = vec![0u8; 32];
        let mut mem = MemoryView::new(&mut buf);

        mem.write_u32(0, 30).unwrap();
        mem.write_u32(4, 16).unwrap();
        assert!(wasi.fd_write(&mut mem, 1, 0, 1, 8).is_err());
        assert_eq!(console.stdout(), "");
    }

    #[test]
    fn test_startup_stubs() {
        let (wasi, _) = shim();
        let mut buf = vec![0xAAu8; 64];
        let mut mem = MemoryView::new(&mut buf);

        assert_eq!(wasi.args_sizes_get(&mut mem, 0, 4).unwrap(), 0);
        assert_eq!(wasi.environ_sizes_get(&mut mem, 8, 12).unwrap(), 0);
        assert_eq!(mem.read_u32_array(0, 4).unwrap(), vec![0, 0, 0, 0]);

        assert_eq!(wasi.fd_prestat_get(3, 0), errno::BADF);
        assert_eq!(wasi.fd_prestat_dir_name(3, 0, 0), errno::INVAL);
        assert_eq!(wasi.unsupported("path_open"), errno::NOSYS);
        assert_eq!(wasi.fd_close(1), errno::SUCCESS);

        assert_eq!(wasi.fd_seek(&mut mem, 1, 10, 0, 16).unwrap(), 0);
        assert_eq!(mem.read_u64(16).unwrap(), 0);
        assert_eq!(wasi.poll_oneoff(&mut mem, 0, 0, 1, 24).unwrap(), 0);
        assert_eq!(mem.read_u32(24).unwrap(), 0);
    }

    #[test]
    fn test_fdstat_for_stdio() {
        let (wasi, _) = shim();
        let mut buf = vec![0xFFu8; 64];
        let mut mem = MemoryView::new(&mut buf);

        assert_eq!(wasi.fd_fdstat_get(&mut mem, 1, 8).unwrap(), errno::SUCCESS);
        assert_eq!(mem.slice(8, 1).unwrap(), &[FILETYPE_CHARACTER_DEVICE]);
        let rights = mem.read_u64(16).unwrap();
        assert_ne!(rights & RIGHT_FD_WRITE, 0);
        // No seek/tell right, so libc treats the fd as a tty
        assert_eq!(rights & ((1 << 2) | (1 << 5)), 0);

        assert_eq!(wasi.fd_fdstat_get(&mut mem, 5, 8).unwrap(), errno::BADF);
    }

    #[test]
    fn test_clock_is_monotonic() {
        let (wasi, _) = shim();
        let mut buf = vec![0u8; 16];
        let mut mem = MemoryView::new(&mut buf);

        wasi.clock_time_get(&mut mem, 1, 1000, 0).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        wasi.clock_time_get(&mut mem, 0, 1000, 8).unwrap();

        let (first, second) = (mem.read_u64(0).unwrap(), mem.read_u64(8).unwrap());
        assert!(second >= first + 1_000_000);
    }

    #[test]
    fn test_random_get_fills_buffer() {
        let (wasi, _) = shim();
        let mut buf = vec![0u8; 64];
        let mut mem = MemoryView::new(&mut buf);

        assert_eq!(wasi.random_get(&mut mem, 0, 32).unwrap(), 0);
        drop(mem);
        assert!(buf[..32].iter().any(|b| *b != 0));
        assert!(buf[32..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_random_get_rejects_oversized_buffer() {
        let (wasi, _) = shim();
        let mut buf = vec![0u8; 64];
        let mut mem = MemoryView::new(&mut buf);

        let err = wasi.random_get(&mut mem, 0, u32::MAX).unwrap_err();
        assert!(matches!(err, BridgeError::MemoryOutOfBounds { len, .. } if len == u32::MAX as u64));
        assert!(wasi.random_get(&mut mem, 60, 8).is_err());
        drop(mem);
        assert!(buf.iter().all(|b| *b == 0));
    }

    #[test]
    fn test_proc_exit_carries_status() {
        let (wasi, _) = shim();
        let exit = wasi.proc_exit(3);
        assert_eq!(exit, ProcExit(3));
        assert_eq!(exit.to_string(), "guest exited with status 3");
    }
}
