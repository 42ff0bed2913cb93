use std::{
    io::{BufRead, BufReader, Read, Write},
    thread,
};

use duplexpipe::{PipeConfig, PipeError, PipeFactory};
use serde_json::{json, Value};

fn factory(dir: &tempfile::TempDir) -> PipeFactory {
    #[cfg(unix)]
    let config = PipeConfig::new().with_temp_dir(dir.path());
    #[cfg(windows)]
    let config = {
        let _ = dir;
        PipeConfig::new()
    };
    PipeFactory::new(config)
}

#[test]
fn owner_and_peer_exchange_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let factory = factory(&dir);
    let owner = factory.make_duplex().unwrap();
    let peer = factory.connect(owner.names()).unwrap();

    let request = b"hello from peer";
    let response = b"hello from owner";

    thread::scope(|s| {
        s.spawn(|| {
            assert_eq!(peer.write(request).unwrap(), request.len());
            let mut buf = [0u8; 16];
            assert_eq!(peer.read(&mut buf).unwrap(), response.len());
            assert_eq!(&buf, response);
        });

        let mut buf = [0u8; 15];
        assert_eq!(owner.read(&mut buf).unwrap(), request.len());
        assert_eq!(&buf, request);
        assert_eq!(owner.write(response).unwrap(), response.len());
    });

    peer.close().unwrap();
    owner.close().unwrap();
}

#[test]
fn json_lines_flow_both_ways() {
    let dir = tempfile::tempdir().unwrap();
    let factory = factory(&dir);
    let owner = factory.make_duplex().unwrap();
    let peer = factory.connect(owner.names()).unwrap();

    let messages = vec![json!({"id": 1, "op": "ping"}), json!([1, 2, 3]), json!("done")];

    thread::scope(|s| {
        s.spawn(|| {
            let mut writer = &peer;
            for message in &messages {
                serde_json::to_writer(&mut writer, message).unwrap();
                writer.write_all(b"\n").unwrap();
            }
            writer.flush().unwrap();

            let mut reader = BufReader::new(&peer);
            for expected in &messages {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                assert_eq!(&serde_json::from_str::<Value>(&line).unwrap(), expected);
            }
        });

        let mut reader = BufReader::new(&owner);
        let mut writer = &owner;
        for _ in 0..messages.len() {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            let value: Value = serde_json::from_str(&line).unwrap();
            serde_json::to_writer(&mut writer, &value).unwrap();
            writer.write_all(b"\n").unwrap();
        }
    });

    peer.close().unwrap();
    owner.close().unwrap();
}

#[test]
fn closed_channel_refuses_io() {
    let dir = tempfile::tempdir().unwrap();
    let factory = factory(&dir);
    let channel = factory.make_duplex().unwrap();
    channel.close().unwrap();

    let mut buf = [0u8; 4];
    assert!(channel.read(&mut buf).unwrap_err().is_closed());
    assert!(channel.write(b"data").unwrap_err().is_closed());

    let io_err = Read::read(&mut &channel, &mut buf).unwrap_err();
    let inner = io_err.get_ref().and_then(|e| e.downcast_ref::<PipeError>());
    assert!(matches!(inner, Some(PipeError::AlreadyClosed { .. })));
}

#[test]
fn double_close_reports_already_closed() {
    let dir = tempfile::tempdir().unwrap();
    let factory = factory(&dir);
    let channel = factory.make_duplex().unwrap();

    assert!(channel.close().is_ok());
    let err = channel.close().unwrap_err();
    assert!(err.is_closed());
}

#[cfg(unix)]
mod fifo {
    use std::{fs, path::PathBuf, sync::mpsc, sync::Arc, time::Duration};

    use duplexpipe::{AccessMode, Endpoint, PipeStrategy};

    use super::*;

    #[test]
    fn never_used_channel_leaves_no_fifos() {
        let dir = tempfile::tempdir().unwrap();
        let channel = factory(&dir).make_duplex().unwrap();
        let names = channel.names().clone();

        channel.close().unwrap();
        assert!(!names.inbound.exists());
        assert!(!names.outbound.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn dropped_channel_removes_fifos() {
        let dir = tempfile::tempdir().unwrap();
        let names = factory(&dir).make_duplex().unwrap().names().clone();
        assert!(!names.inbound.exists());
        assert!(!names.outbound.exists());
    }

    #[test]
    fn peer_close_keeps_owner_fifos() {
        let dir = tempfile::tempdir().unwrap();
        let factory = factory(&dir);
        let owner = factory.make_duplex().unwrap();
        let peer = factory.connect(owner.names()).unwrap();

        peer.close().unwrap();
        assert!(owner.names().inbound.exists());
        assert!(owner.names().outbound.exists());
        owner.close().unwrap();
    }

    #[test]
    fn colliding_outbound_path_aborts_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let factory = factory(&dir);
        let in_path = dir.path().join("000000042.in.pipe");
        let out_path = dir.path().join("000000042.out.pipe");
        fs::write(&out_path, b"").unwrap();

        let err = factory
            .strategy()
            .materialize(&[in_path.clone(), out_path.clone()])
            .unwrap_err();

        assert!(matches!(err, PipeError::PipeCreateFailed { .. }));
        assert!(!in_path.exists());
        let left: Vec<PathBuf> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(left, vec![out_path]);
    }

    #[test]
    fn close_releases_a_read_blocked_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let channel = Arc::new(factory(&dir).make_duplex().unwrap());
        let names = channel.names().clone();
        let (tx, rx) = mpsc::channel();

        let reader = {
            let channel = Arc::clone(&channel);
            thread::spawn(move || {
                let mut buf = [0u8; 8];
                tx.send(channel.read(&mut buf)).unwrap();
            })
        };
        // Let the reader block waiting for a writer to show up.
        thread::sleep(Duration::from_millis(100));

        channel.close().unwrap();
        let result = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("read still blocked after close");
        assert!(matches!(result, Err(PipeError::AlreadyClosed { .. })));
        reader.join().unwrap();

        assert!(!names.inbound.exists());
        assert!(!names.outbound.exists());
    }

    #[test]
    fn single_read_write_fifo() {
        let test_msg = b"test message";
        let dir = tempfile::tempdir().unwrap();
        let pipe = factory(&dir).temp_fifo().unwrap();

        thread::scope(|s| {
            s.spawn(|| {
                let n = pipe.write(test_msg).unwrap();
                assert_eq!(n, test_msg.len());
            });
            s.spawn(|| {
                let mut buffer = [0u8; 12];
                let n = pipe.read(&mut buffer).unwrap();
                assert_eq!(n, test_msg.len());
                assert_eq!(&buffer, test_msg);
            });
        });

        assert!(pipe.close().is_ok());
    }

    #[test]
    fn line_reader_over_fifo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lines.pipe");
        let pipe = Endpoint::create(&path, AccessMode::ReadWrite).unwrap();

        thread::scope(|s| {
            s.spawn(|| writeln!(&pipe, "Hello pipe!").unwrap());
            let mut line = String::new();
            BufReader::new(&pipe).read_line(&mut line).unwrap();
            assert_eq!(line, "Hello pipe!\n");
        });

        pipe.close().unwrap();
        assert!(!path.exists());
    }
}
