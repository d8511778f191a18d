use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::net::UdpSocket;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Flat field-name to stringified-value mapping, as the store keeps it.
pub type Fields = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum UplinkError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("rejected: {0}")]
    Rejected(String),
}

/// Durable store for keyed records. A write to an existing path replaces it.
pub trait UplinkSink {
    fn set_record(&mut self, path: &str, fields: &Fields) -> Result<(), UplinkError>;
}

impl<T: UplinkSink + ?Sized> UplinkSink for Box<T> {
    fn set_record(&mut self, path: &str, fields: &Fields) -> Result<(), UplinkError> {
        (**self).set_record(path, fields)
    }
}

/// Datagram exchanged between the device and the collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadMessage {
    pub path: String,
    pub fields: Fields,
}

// Upload messages are single datagrams.
pub const MAX_UPLOAD_SIZE: usize = 1460;

pub struct UdpUplink {
    socket: UdpSocket,
    addr: String,
}

impl UdpUplink {
    /// The write timeout bounds how long a tick can stall on the network.
    pub fn new(addr: &str, timeout: Duration) -> Result<UdpUplink, UplinkError> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_write_timeout(Some(timeout))?;
        Ok(UdpUplink {
            socket,
            addr: addr.to_owned(),
        })
    }
}

impl UplinkSink for UdpUplink {
    fn set_record(&mut self, path: &str, fields: &Fields) -> Result<(), UplinkError> {
        let msg = UploadMessage {
            path: path.to_owned(),
            fields: fields.clone(),
        };
        let out_bytes = serde_json::to_vec(&msg)?;
        if out_bytes.len() > MAX_UPLOAD_SIZE {
            return Err(UplinkError::Rejected(format!(
                "message too large: {}",
                out_bytes.len()
            )));
        }
        self.socket.send_to(&out_bytes, &self.addr)?;
        Ok(())
    }
}

/// Stores each record as `<root>/<path>.json`, replaced atomically.
pub struct FileUplink {
    root: PathBuf,
}

impl FileUplink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileUplink { root: root.into() }
    }

    pub fn record_file(&self, path: &str) -> Result<PathBuf, UplinkError> {
        let rel = Path::new(path.trim_start_matches('/'));
        let valid = rel.components().count() > 0
            && rel.components().all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(UplinkError::Rejected(format!("invalid path: {:?}", path)));
        }
        let mut file = self.root.join(rel).into_os_string();
        file.push(".json");
        Ok(PathBuf::from(file))
    }
}

impl UplinkSink for FileUplink {
    fn set_record(&mut self, path: &str, fields: &Fields) -> Result<(), UplinkError> {
        let target = self.record_file(path)?;
        if let Some(dir) = target.parent() {
            fs::create_dir_all(dir)?;
        }
        let tmp = target.with_extension("json.new");
        let written = write_json(&tmp, fields).and_then(|()| Ok(fs::rename(&tmp, &target)?));
        if written.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        written
    }
}

fn write_json(path: &Path, fields: &Fields) -> Result<(), UplinkError> {
    let mut file = File::create(path)?;
    serde_json::to_writer_pretty(&mut file, fields)?;
    writeln!(file)?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Keeps records in memory; `fail_with` makes every write fail.
    #[derive(Default)]
    pub struct MemorySink {
        pub records: BTreeMap<String, Fields>,
        pub attempts: usize,
        pub fail_with: Option<String>,
    }

    impl UplinkSink for MemorySink {
        fn set_record(&mut self, path: &str, fields: &Fields) -> Result<(), UplinkError> {
            self.attempts += 1;
            if let Some(reason) = &self.fail_with {
                return Err(UplinkError::Rejected(reason.clone()));
            }
            self.records.insert(path.to_owned(), fields.clone());
            Ok(())
        }
    }

    fn fields(t: &str) -> Fields {
        [("temperature".to_string(), t.to_string())].into_iter().collect()
    }

    #[test]
    fn file_uplink_writes_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileUplink::new(dir.path());
        let path = "/UsersData/dev/readings/10:0 1-1-2024";

        sink.set_record(path, &fields("25.50")).unwrap();
        sink.set_record(path, &fields("26.00")).unwrap();

        let file = dir.path().join("UsersData/dev/readings/10:0 1-1-2024.json");
        let stored: Fields = serde_json::from_str(&fs::read_to_string(file).unwrap()).unwrap();
        assert_eq!(stored, fields("26.00"));
        let leftovers: Vec<_> = fs::read_dir(dir.path().join("UsersData/dev/readings"))
            .unwrap()
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn failed_replace_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the record file should go makes the rename fail.
        fs::create_dir_all(dir.path().join("readings/10:0 1-1-2024.json/x")).unwrap();
        let mut sink = FileUplink::new(dir.path());

        let err = sink
            .set_record("/readings/10:0 1-1-2024", &fields("25.50"))
            .unwrap_err();
        assert!(matches!(err, UplinkError::Io(_)));
        assert!(!dir.path().join("readings/10:0 1-1-2024.json.new").exists());
    }

    #[test]
    fn file_uplink_rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileUplink::new(dir.path());
        for bad in ["/../etc/passwd", "/", "a/../b"] {
            let err = sink.set_record(bad, &fields("1")).unwrap_err();
            assert!(matches!(err, UplinkError::Rejected(_)), "{}", bad);
        }
    }

    #[test]
    fn udp_uplink_sends_one_datagram() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let addr = receiver.local_addr().unwrap().to_string();
        let mut sink = UdpUplink::new(&addr, Duration::from_secs(1)).unwrap();

        sink.set_record("/a/b", &fields("nan")).unwrap();

        let mut buf = [0; MAX_UPLOAD_SIZE];
        let (sz, _) = receiver.recv_from(&mut buf).unwrap();
        let msg: UploadMessage = serde_json::from_slice(&buf[..sz]).unwrap();
        assert_eq!(msg.path, "/a/b");
        assert_eq!(msg.fields, fields("nan"));
    }
}
