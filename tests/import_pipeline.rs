use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use wxrbook::import::{stage, ImportWarning, Importer};
use wxrbook::model::{AssetStatus, PostStatus, PostType};
use wxrbook::store::BookDir;
use wxrbook::{ImportConfig, PoliteClient};

static PIXEL_PNG: &[u8] = &[
    137, 80, 78, 71, 13, 10, 26, 10, 0, 0, 0, 13, 73, 72, 68, 82, 0, 0, 0, 1, 0, 0, 0, 1, 8, 4, 0,
    0, 0, 181, 28, 12, 2, 0, 0, 0, 11, 73, 68, 65, 84, 120, 218, 99, 252, 255, 23, 0, 2, 3, 1, 128,
    110, 220, 25, 0, 0, 0, 0, 73, 69, 78, 68, 174, 66, 96, 130,
];

type RequestLog = Arc<Mutex<Vec<String>>>;

fn spawn_image_server() -> (String, RequestLog, mpsc::Sender<()>, thread::JoinHandle<()>) {
    let server = tiny_http::Server::http("127.0.0.1:0").expect("start tiny_http server");
    let base_url = format!("http://{}", server.server_addr());
    let log: RequestLog = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&log);

    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

    let handle = thread::spawn(move || loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        let request = match server.recv_timeout(Duration::from_millis(50)) {
            Ok(Some(req)) => req,
            Ok(None) => continue,
            Err(_) => break,
        };

        let url = request.url().to_string();
        seen.lock().expect("request log").push(url.clone());

        let response = match url.as_str() {
            "/img/photo.png" | "/img/mislabelled.jpg" => {
                tiny_http::Response::from_data(PIXEL_PNG.to_vec()).with_status_code(200)
            }
            "/img/fake.png" => tiny_http::Response::from_data(b"this is not a picture".to_vec())
                .with_status_code(200),
            _ => tiny_http::Response::from_data(b"not found".to_vec()).with_status_code(404),
        };
        let _ = request.respond(response);
    });

    (base_url, log, shutdown_tx, handle)
}

fn book_xml(base: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" ?>
<rss version="2.0"
    xmlns:content="http://purl.org/rss/1.0/modules/content/"
    xmlns:wp="http://wordpress.org/export/1.2/">
<channel>
    <title>Pipeline Book</title>
    <wp:wxr_version>1.2</wp:wxr_version>
    <wp:term>
        <wp:term_taxonomy>front-matter-type</wp:term_taxonomy>
        <wp:term_slug>preface</wp:term_slug>
        <wp:term_name>Preface</wp:term_name>
    </wp:term>
    <item>
        <title>Chapter</title>
        <wp:post_id>20</wp:post_id>
        <wp:post_parent>10</wp:post_parent>
        <wp:menu_order>1</wp:menu_order>
        <wp:post_type>chapter</wp:post_type>
        <content:encoded><![CDATA[<p><img src="{base}/img/photo.png"><img src="{base}/img/missing.png"><img src="{base}/notes.txt"></p>]]></content:encoded>
    </item>
    <item>
        <title>Preface</title>
        <wp:post_id>5</wp:post_id>
        <wp:menu_order>1</wp:menu_order>
        <wp:post_type>front-matter</wp:post_type>
        <category domain="front-matter-type" nicename="preface"><![CDATA[Preface]]></category>
        <content:encoded><![CDATA[<p>Hello <img src="{base}/img/photo.png" alt="p"> <img src="{base}/img/mislabelled.jpg"> <img src="{base}/img/fake.png"></p>]]></content:encoded>
    </item>
    <item>
        <title>Part</title>
        <wp:post_id>10</wp:post_id>
        <wp:menu_order>2</wp:menu_order>
        <wp:post_type>part</wp:post_type>
    </item>
</channel>
</rss>
"#
    )
}

#[test]
fn commit_downloads_each_image_once_and_marks_failures() -> anyhow::Result<()> {
    let (base_url, log, shutdown_tx, server_handle) = spawn_image_server();
    let temp = tempfile::TempDir::new()?;
    let source = temp.path().join("book.xml");
    std::fs::write(&source, book_xml(&base_url))?;

    let config = ImportConfig::default();
    let mut selection = stage(&source, &config)?;
    selection.default_status = PostStatus::Publish;
    let ids: Vec<&str> = selection.staged.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["5", "10", "20"]);

    let mut book = BookDir::open(temp.path().join("out"))?;
    let mut media = book.media(None);
    let mut client = PoliteClient::builder().timeout_secs(5).build()?;
    let report = Importer::new(&config, &mut book.store, &mut media, &mut client).commit(selection)?;
    book.save()?;

    let _ = shutdown_tx.send(());
    let _ = server_handle.join();

    assert_eq!(
        report.totals.to_string(),
        "Imported 1 front matter, 1 part, 1 chapter, and 0 back matter."
    );

    let requests = log.lock().expect("request log").clone();
    assert_eq!(
        requests.iter().filter(|u| u.as_str() == "/img/photo.png").count(),
        1,
        "shared image fetched more than once: {requests:?}"
    );
    assert!(!requests.iter().any(|u| u.ends_with(".txt")));

    let media_dir = temp.path().join("out").join("media");
    assert!(media_dir.join("photo.png").is_file());
    assert!(media_dir.join("mislabelled.png").is_file());
    assert!(!media_dir.join("fake.png").exists());

    let preface = book
        .store
        .records_of_type(&PostType::FrontMatter)
        .next()
        .expect("front matter record");
    assert!(preface.content.contains(r#"src="media/photo.png""#));
    assert!(preface.content.contains(r#"src="media/mislabelled.png""#));
    assert!(preface
        .content
        .contains(&format!(r##"src="{base_url}/img/fake.png#fixme""##)));
    assert_eq!(
        preface.terms.get("front-matter-type"),
        Some(&vec!["preface".to_string()])
    );

    let chapter = book
        .store
        .records_of_type(&PostType::Chapter)
        .next()
        .expect("chapter record");
    let part = book
        .store
        .records_of_type(&PostType::Part)
        .next()
        .expect("part record");
    assert_eq!(chapter.parent, Some(part.id));
    assert!(chapter.content.contains(r#"src="media/photo.png""#));
    assert!(chapter
        .content
        .contains(&format!(r##"src="{base_url}/img/missing.png#fixme""##)));
    assert!(chapter
        .content
        .contains(&format!(r##"src="{base_url}/notes.txt#fixme""##)));

    let statuses: Vec<AssetStatus> = report
        .warnings
        .iter()
        .filter_map(|w| match w {
            ImportWarning::BrokenImage { status, .. } => Some(*status),
            ImportWarning::Markup { .. } => None,
        })
        .collect();
    assert_eq!(
        statuses,
        vec![
            AssetStatus::Corrupt,
            AssetStatus::DownloadFailed,
            AssetStatus::UnsupportedType,
        ]
    );

    let reopened = BookDir::open(temp.path().join("out"))?;
    assert_eq!(reopened.store.records.len(), 3);
    assert_eq!(reopened.store.terms.len(), 1);
    Ok(())
}
