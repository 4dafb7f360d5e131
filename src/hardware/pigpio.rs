// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-eggbot project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Minimal pigpio daemon client
//!
//! The pigpio daemon speaks a fixed-size binary protocol over TCP: each
//! request and each response is four little-endian u32 words
//! `(cmd, p1, p2, p3/res)`. Only the commands the servo actuator needs are
//! implemented: `SERVO` (set pulse width), `GPW` (read pulse width back),
//! and `PIGPV` (daemon version, used as the health-check ping).

use log::debug;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Set servo pulse width on a GPIO.
const CMD_SERVO: u32 = 8;
/// Read the pigpio daemon version.
const CMD_PIGPV: u32 = 26;
/// Get the current servo pulse width on a GPIO.
const CMD_GPW: u32 = 84;

/// Timeout for the initial TCP port probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
/// Timeout applied to session reads and writes.
const SESSION_TIMEOUT: Duration = Duration::from_secs(2);

/// One session with the pigpio daemon.
pub struct PigpioClient {
    stream: TcpStream,
    host: String,
    port: u16,
}

impl PigpioClient {
    /// Probe the daemon's TCP port, then open a session.
    pub fn connect(host: &str, port: u16) -> io::Result<Self> {
        let addr = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    format!("cannot resolve {host}:{port}"),
                )
            })?;

        // Probe first so an absent daemon fails fast with a clear error.
        let probe = TcpStream::connect_timeout(&addr, PROBE_TIMEOUT)?;
        drop(probe);

        let stream = TcpStream::connect_timeout(&addr, PROBE_TIMEOUT)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(SESSION_TIMEOUT))?;
        stream.set_write_timeout(Some(SESSION_TIMEOUT))?;

        debug!("pigpio session opened to {host}:{port}");
        Ok(Self {
            stream,
            host: host.to_string(),
            port,
        })
    }

    /// Remote endpoint this session is connected to.
    pub fn endpoint(&self) -> (&str, u16) {
        (&self.host, self.port)
    }

    /// Issue one command and return the result word.
    fn command(&mut self, cmd: u32, p1: u32, p2: u32) -> io::Result<i32> {
        let mut request = [0u8; 16];
        request[0..4].copy_from_slice(&cmd.to_le_bytes());
        request[4..8].copy_from_slice(&p1.to_le_bytes());
        request[8..12].copy_from_slice(&p2.to_le_bytes());
        self.stream.write_all(&request)?;

        let mut response = [0u8; 16];
        self.stream.read_exact(&mut response)?;
        let res = i32::from_le_bytes([response[12], response[13], response[14], response[15]]);
        Ok(res)
    }

    /// Issue a command whose negative result codes indicate daemon errors.
    fn checked_command(&mut self, cmd: u32, p1: u32, p2: u32) -> io::Result<i32> {
        let res = self.command(cmd, p1, p2)?;
        if res < 0 {
            return Err(io::Error::other(format!(
                "pigpio command {cmd} failed with code {res}"
            )));
        }
        Ok(res)
    }

    /// Set the servo pulse width on a GPIO. A width of 0 releases the servo.
    pub fn set_servo_pulsewidth(&mut self, gpio: u8, pulse_width_us: u32) -> io::Result<()> {
        self.checked_command(CMD_SERVO, gpio as u32, pulse_width_us)?;
        Ok(())
    }

    /// Read back the current servo pulse width on a GPIO.
    pub fn get_servo_pulsewidth(&mut self, gpio: u8) -> io::Result<u32> {
        let res = self.checked_command(CMD_GPW, gpio as u32, 0)?;
        Ok(res as u32)
    }

    /// Daemon version; doubles as the health-check ping.
    pub fn version(&mut self) -> io::Result<u32> {
        let res = self.checked_command(CMD_PIGPV, 0, 0)?;
        Ok(res as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    /// A scripted pigpio daemon: answers each 16-byte command with the next
    /// result word. The client's port probe opens and drops a connection
    /// before the session, so accept until the scripted results are spent.
    fn spawn_fake_daemon(results: Vec<i32>) -> (u16, thread::JoinHandle<Vec<(u32, u32, u32)>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let mut received = Vec::new();
            let mut remaining = results;
            'connections: while !remaining.is_empty() {
                let Ok((mut stream, _)) = listener.accept() else {
                    break;
                };
                loop {
                    let mut request = [0u8; 16];
                    if stream.read_exact(&mut request).is_err() {
                        // Probe connection or session end; wait for the next one.
                        continue 'connections;
                    }
                    let cmd = u32::from_le_bytes([request[0], request[1], request[2], request[3]]);
                    let p1 = u32::from_le_bytes([request[4], request[5], request[6], request[7]]);
                    let p2 = u32::from_le_bytes([request[8], request[9], request[10], request[11]]);
                    received.push((cmd, p1, p2));

                    let res = remaining.remove(0);
                    let mut response = [0u8; 16];
                    response[0..12].copy_from_slice(&request[0..12]);
                    response[12..16].copy_from_slice(&res.to_le_bytes());
                    stream.write_all(&response).unwrap();
                    if remaining.is_empty() {
                        break 'connections;
                    }
                }
            }
            received
        });
        (port, handle)
    }

    #[test]
    fn test_servo_command_frame() {
        let (port, handle) = spawn_fake_daemon(vec![0]);
        let mut client = PigpioClient::connect("127.0.0.1", port).unwrap();
        client.set_servo_pulsewidth(18, 1433).unwrap();
        drop(client);
        let received = handle.join().unwrap();
        assert_eq!(received, vec![(CMD_SERVO, 18, 1433)]);
    }

    #[test]
    fn test_negative_result_is_error() {
        let (port, handle) = spawn_fake_daemon(vec![-93]);
        let mut client = PigpioClient::connect("127.0.0.1", port).unwrap();
        let err = client.set_servo_pulsewidth(18, 20_000).unwrap_err();
        assert!(err.to_string().contains("-93"));
        drop(client);
        handle.join().unwrap();
    }

    #[test]
    fn test_version_round_trip() {
        let (port, handle) = spawn_fake_daemon(vec![79]);
        let mut client = PigpioClient::connect("127.0.0.1", port).unwrap();
        assert_eq!(client.version().unwrap(), 79);
        drop(client);
        let received = handle.join().unwrap();
        assert_eq!(received[0].0, CMD_PIGPV);
    }

    #[test]
    fn test_connect_fails_fast_without_daemon() {
        // Port 1 is essentially never listening.
        let result = PigpioClient::connect("127.0.0.1", 1);
        assert!(result.is_err());
    }
}
