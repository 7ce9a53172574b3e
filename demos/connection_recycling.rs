//! Connection recycling example
//!
//! Spins up a loopback echo server, then has a group of worker threads share
//! a small connection pool: each request borrows a connection, round-trips a
//! message, and returns the connection to circulation. The pool caps the
//! number of live sockets well below the number of workers.

use cycleq::pool::{ConnectionPool, PoolConfig};
use cycleq::Error;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;

const WORKERS: usize = 8;
const REQUESTS_PER_WORKER: usize = 25;
const POOL_CAPACITY: usize = 3;

fn spawn_echo_server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback listener");
    let port = listener.local_addr().expect("local addr").port();

    thread::spawn(move || {
        for socket in listener.incoming().flatten() {
            thread::spawn(move || {
                let mut socket = socket;
                let mut buf = [0u8; 64];
                while let Ok(n) = socket.read(&mut buf) {
                    if n == 0 || socket.write_all(&buf[..n]).is_err() {
                        break;
                    }
                }
            });
        }
    });

    port
}

fn main() -> Result<(), Error> {
    let port = spawn_echo_server();
    let pool = Arc::new(ConnectionPool::new(PoolConfig::new(
        "127.0.0.1",
        port,
        POOL_CAPACITY,
    ))?);

    println!(
        "recycling up to {POOL_CAPACITY} connections across {WORKERS} workers ({REQUESTS_PER_WORKER} requests each)"
    );

    let mut workers = Vec::new();
    for worker_id in 0..WORKERS {
        let pool = Arc::clone(&pool);
        workers.push(thread::spawn(move || {
            let mut served = 0;
            while served < REQUESTS_PER_WORKER {
                let handle = match pool.acquire() {
                    Ok(handle) => handle,
                    // All connections are borrowed right now; let a peer
                    // finish and try again.
                    Err(Error::OutOfCapacity) => {
                        thread::yield_now();
                        continue;
                    }
                    Err(err) => panic!("worker {worker_id}: {err}"),
                };

                let message = format!("w{worker_id}r{served}");
                let reply = pool
                    .with_stream(handle, |stream| {
                        stream.write_all(message.as_bytes())?;
                        let mut buf = vec![0u8; message.len()];
                        stream.read_exact(&mut buf)?;
                        Ok(buf)
                    })
                    .expect("echo round-trip");
                assert_eq!(reply, message.as_bytes());

                pool.release(handle).expect("release borrowed handle");
                served += 1;
            }
        }));
    }

    for worker in workers {
        worker.join().expect("worker thread");
    }

    println!(
        "done: {} requests served over {} sockets ({} idle)",
        WORKERS * REQUESTS_PER_WORKER,
        pool.tracked(),
        pool.idle()
    );
    Ok(())
}
