// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! TCP listener and per-connection session state.
//!
//! A session owns its buffer and socket; framing lines out of it is the
//! ingress pipeline's job, not this module's.

use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, RawFd};

use socket2::{Domain, Socket, Type};

use crate::buffer::Buffer;

pub struct TcpListener {
    socket: Socket,
}

impl TcpListener {
    pub fn bind(bind_spec: &str) -> io::Result<Self> {
        let addr = super::resolve_bind(bind_spec)?;
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, None)?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(128)?;
        Ok(TcpListener { socket })
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }

    /// Actual bound address, useful when `bind` was given port 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket
            .local_addr()?
            .as_socket()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "non-IP local address"))
    }

    /// Accept every connection currently queued. The listener is
    /// level-triggered and non-blocking, so this drains the backlog down
    /// to `WouldBlock` rather than accepting exactly one per readiness
    /// event.
    pub fn accept_all(&self) -> Vec<Session> {
        let mut sessions = Vec::new();
        loop {
            match self.socket.accept() {
                Ok((socket, _addr)) => {
                    if socket.set_nonblocking(true).is_ok() {
                        sessions.push(Session::new(socket));
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(_) => break,
            }
        }
        sessions
    }
}

pub struct Session {
    socket: Socket,
    pub buffer: Buffer,
}

impl Session {
    fn new(socket: Socket) -> Self {
        Session { socket, buffer: Buffer::default() }
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }

    /// Read as much as is available into `self.buffer`. Matches §4.4's TCP
    /// read step: if there is no room, realign first, then expand only if
    /// realigning didn't free any.
    pub fn read_more(&mut self) -> io::Result<usize> {
        if self.buffer.spacecount() == 0 {
            self.buffer.realign();
            if self.buffer.spacecount() == 0 {
                self.buffer.expand();
            }
        }
        let n = self.socket.read(self.buffer.writable())?;
        if n > 0 {
            self.buffer.produced(n).expect("just sized writable() to fit n bytes");
        }
        Ok(n)
    }

    /// Blocking-until-drained write used only for the `status\n` response:
    /// loops through `WouldBlock` until the peer has accepted everything
    /// or closed the connection.
    pub fn write_all_blocking(&mut self, mut bytes: &[u8]) -> io::Result<()> {
        while !bytes.is_empty() {
            match self.socket.write(bytes) {
                Ok(0) => return Ok(()),
                Ok(n) => bytes = &bytes[n..],
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    std::thread::yield_now();
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
