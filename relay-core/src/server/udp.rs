// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! UDP listener: one `recv` per readiness event, framed into lines
//! identically to the TCP path except a trailing partial line (no final
//! newline) is still treated as a complete record.

use std::io;
use std::os::fd::{AsRawFd, RawFd};

use socket2::{Domain, Socket, Type};

/// Fixed per spec.md §4.4: UDP datagrams never exceed this.
pub const UDP_READ_BUF_SIZE: usize = 65_536;

pub struct UdpListener {
    socket: Socket,
}

impl UdpListener {
    pub fn bind(bind_spec: &str) -> io::Result<Self> {
        let addr = super::resolve_bind(bind_spec)?;
        let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, None)?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        Ok(UdpListener { socket })
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }

    /// Receive one datagram into `buf`, returning its length, or `None`
    /// once the socket has no more pending datagrams.
    pub fn recv_one(&self, buf: &mut [u8; UDP_READ_BUF_SIZE]) -> io::Result<Option<usize>> {
        use std::io::Read;
        match (&self.socket).read(buf) {
            Ok(n) => Ok(Some(n)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}
