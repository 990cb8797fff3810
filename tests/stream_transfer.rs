//! 스트림 바인딩 루프백 테스트

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use rand::RngCore;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use splitfetch::{Catalog, CatalogEntry, Command, Config, Error, StreamClient, StreamServer};

fn random_bytes(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut data);
    data
}

/// 파일들을 쓰고 서버를 띄운 뒤 주소 반환
async fn start_server(root: &Path, files: &[(&str, &[u8])]) -> SocketAddr {
    let mut entries = Vec::new();
    for (name, data) in files {
        std::fs::write(root.join(name), data).unwrap();
        entries.push(CatalogEntry::new(*name, data.len() as u64));
    }
    let catalog = Arc::new(Catalog::new(root, entries));

    let server = StreamServer::bind("127.0.0.1:0".parse().unwrap(), catalog, Config::default())
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.serve());
    addr
}

#[tokio::test]
async fn test_download_with_remainder() {
    let served = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();

    // 4로 나누어떨어지지 않는 크기: 마지막 범위가 나머지를 가져감
    let data = random_bytes(1024 * 1024 + 3);
    let addr = start_server(served.path(), &[("movie.bin", data.as_slice())]).await;

    let client = StreamClient::new(addr, Config::default());
    let report = client.download("movie.bin", out.path()).await.unwrap();

    assert!(report.complete);
    assert!(report.failed_units.is_empty());
    assert_eq!(report.units_total, 4);
    assert_eq!(report.bytes_written, data.len() as u64);
    assert_eq!(report.path, out.path().join("movie.bin"));
    assert_eq!(std::fs::read(&report.path).unwrap(), data);
    assert!(!out.path().join("movie.bin.part").exists());
}

#[tokio::test]
async fn test_tiny_and_empty_files() {
    let served = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let addr = start_server(served.path(), &[("three.txt", &b"abc"[..]), ("empty.txt", &b""[..])]).await;
    let client = StreamClient::new(addr, Config::default());

    let report = client.download("three.txt", out.path()).await.unwrap();
    assert!(report.complete);
    assert_eq!(std::fs::read(&report.path).unwrap(), b"abc");

    let report = client.download("empty.txt", out.path()).await.unwrap();
    assert!(report.complete);
    assert_eq!(std::fs::read(&report.path).unwrap().len(), 0);
}

#[tokio::test]
async fn test_output_directory_is_created() {
    let served = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let nested = out.path().join("a").join("b");
    let addr = start_server(served.path(), &[("x.bin", &b"hello world"[..])]).await;

    let report = StreamClient::new(addr, Config::default())
        .download("x.bin", &nested)
        .await
        .unwrap();
    assert!(report.complete);
    assert_eq!(std::fs::read(nested.join("x.bin")).unwrap(), b"hello world");
}

#[tokio::test]
async fn test_unknown_file_fails_before_output() {
    let served = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let addr = start_server(served.path(), &[("x.bin", &b"data"[..])]).await;

    let err = StreamClient::new(addr, Config::default())
        .download("nope.bin", out.path())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::FileNotFound(name) if name == "nope.bin"));
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_list_and_size() {
    let served = tempfile::tempdir().unwrap();
    let addr = start_server(served.path(), &[("a.bin", &b"12345"[..]), ("b.bin", &b""[..])]).await;
    let client = StreamClient::new(addr, Config::default());

    assert_eq!(client.list().await.unwrap(), "a.bin - 5B\nb.bin - 0B");
    assert_eq!(client.size_of("a.bin").await.unwrap(), 5);
}

#[tokio::test]
async fn test_empty_catalog_list() {
    let served = tempfile::tempdir().unwrap();
    let addr = start_server(served.path(), &[]).await;

    let err = StreamClient::new(addr, Config::default()).list().await.unwrap_err();
    assert!(matches!(err, Error::NoFilesAvailable));
}

#[tokio::test]
async fn test_invalid_command_keeps_connection() {
    let served = tempfile::tempdir().unwrap();
    let addr = start_server(served.path(), &[("a.bin", &b"12345"[..])]).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut buf = [0u8; 256];

    stream.write_all(b"HELLO").await.unwrap();
    let n = stream.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"ERROR: Invalid command");

    // 같은 연결에서 다음 명령도 처리
    stream.write_all(b"SIZE a.bin").await.unwrap();
    let n = stream.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"5");
}

#[tokio::test]
async fn test_range_request_is_exact() {
    let served = tempfile::tempdir().unwrap();
    let data = random_bytes(1000);
    let addr = start_server(served.path(), &[("r.bin", data.as_slice())]).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"DOWNLOAD r.bin 250 300").await.unwrap();

    // 서버는 범위 전송 후 연결을 닫음
    let mut received = Vec::new();
    stream.read_to_end(&mut received).await.unwrap();
    assert_eq!(received, &data[250..550]);
}

#[tokio::test]
async fn test_server_gone_is_connection_failure() {
    // 바인딩 후 바로 닫아 빈 포트 확보
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let out = tempfile::tempdir().unwrap();
    let err = StreamClient::new(addr, Config::default())
        .download("a.bin", out.path())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConnectionFailure(_)));
}

/// SIZE에는 `size`, 범위 요청에는 `respond(offset, len)`을 돌려주는 가짜 서버
async fn start_scripted_server<R>(size: u64, respond: R) -> SocketAddr
where
    R: Fn(u64, u64) -> Vec<u8> + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let respond = Arc::new(respond);

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let respond = respond.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 256];
                let n = stream.read(&mut buf).await.unwrap();
                let reply = match Command::parse(&buf[..n]).unwrap() {
                    Command::Size { .. } => size.to_string().into_bytes(),
                    Command::Download {
                        offset,
                        length: Some(len),
                        ..
                    } => respond(offset, len),
                    other => panic!("unexpected command: {other}"),
                };
                stream.write_all(&reply).await.unwrap();
                let _ = stream.shutdown().await;
            });
        }
    });
    addr
}

#[tokio::test]
async fn test_short_range_is_kept_but_not_committed() {
    let out = tempfile::tempdir().unwrap();
    let data = random_bytes(200);
    let served = data.clone();

    // 두 번째 범위만 절반 보내고 연결 종료
    let addr = start_scripted_server(200, move |offset, len| {
        let start = offset as usize;
        let len = (if offset == 50 { len / 2 } else { len }) as usize;
        served[start..start + len].to_vec()
    })
    .await;

    let report = StreamClient::new(addr, Config::default())
        .download("f.bin", out.path())
        .await
        .unwrap();

    assert!(!report.complete);
    assert_eq!(report.failed_units, vec![1]);
    assert_eq!(report.units_completed, 3);
    assert_eq!(report.bytes_written, 175);
    assert_eq!(report.path, out.path().join("f.bin.part"));

    let expected = [&data[..75], &data[100..]].concat();
    assert_eq!(std::fs::read(&report.path).unwrap(), expected);
    assert!(!out.path().join("f.bin").exists());
}

#[tokio::test]
async fn test_huge_advertised_size_does_not_preallocate() {
    let out = tempfile::tempdir().unwrap();
    let addr = start_scripted_server(1 << 62, |_, _| b"abc".to_vec()).await;

    let report = StreamClient::new(addr, Config::default())
        .download("huge.bin", out.path())
        .await
        .unwrap();

    assert!(!report.complete);
    assert_eq!(report.failed_units, vec![0, 1, 2, 3]);
    assert_eq!(report.bytes_written, 12);
    assert_eq!(std::fs::read(&report.path).unwrap(), b"abcabcabcabc");
}

#[tokio::test]
async fn test_payload_starting_with_error_bytes_is_kept() {
    let out = tempfile::tempdir().unwrap();
    let data = random_bytes(200);
    let served = data.clone();

    // 짧게 끊긴 범위의 데이터가 우연히 "ERROR"로 시작
    let addr = start_scripted_server(200, move |offset, len| {
        if offset == 50 {
            return b"ERROR\xff".to_vec();
        }
        served[offset as usize..(offset + len) as usize].to_vec()
    })
    .await;

    let report = StreamClient::new(addr, Config::default())
        .download("f.bin", out.path())
        .await
        .unwrap();

    assert!(!report.complete);
    assert_eq!(report.failed_units, vec![1]);
    assert_eq!(report.bytes_written, 156);
    let part = std::fs::read(&report.path).unwrap();
    assert_eq!(&part[..50], &data[..50]);
    assert_eq!(&part[50..56], b"ERROR\xff");
    assert_eq!(&part[56..], &data[100..]);
}

#[tokio::test]
async fn test_error_reply_drops_range() {
    let out = tempfile::tempdir().unwrap();
    let data = random_bytes(200);
    let served = data.clone();

    let addr = start_scripted_server(200, move |offset, len| {
        if offset == 50 {
            return b"ERROR: boom".to_vec();
        }
        served[offset as usize..(offset + len) as usize].to_vec()
    })
    .await;

    let report = StreamClient::new(addr, Config::default())
        .download("f.bin", out.path())
        .await
        .unwrap();

    assert!(!report.complete);
    assert_eq!(report.failed_units, vec![1]);
    assert_eq!(report.bytes_written, 150);
    let expected = [&data[..50], &data[100..]].concat();
    assert_eq!(std::fs::read(&report.path).unwrap(), expected);
}
