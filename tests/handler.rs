//! Request handler integration tests.

mod common;

use std::time::Duration;

use common::{temp_store, FakeFetcher, FakeSink, Sent};
use rstest::rstest;
use vidsave::delivery::ChatId;
use vidsave::errors::{DownloadError, LinkError};
use vidsave::handler::{INTERNAL_ERROR_MESSAGE, SEND_LINK_PROMPT};
use vidsave::{
    CancellationToken, Coordinator, Delivery, DownloadOptions, LinkResolver, Outcome,
    RequestHandler, SqliteCacheStore,
};

const CHAT: ChatId = ChatId(-100123);

fn handler(
    store: SqliteCacheStore,
    fetcher: FakeFetcher,
) -> RequestHandler<SqliteCacheStore, FakeFetcher, FakeSink> {
    let options = DownloadOptions::builder()
        .progress_interval(Duration::ZERO)
        .build()
        .unwrap();
    RequestHandler::new(
        LinkResolver::default(),
        Coordinator::new(store, fetcher, FakeSink::new(), options),
    )
}

fn texts(handler: &RequestHandler<SqliteCacheStore, FakeFetcher, FakeSink>) -> Vec<String> {
    handler
        .coordinator()
        .sink()
        .sent()
        .into_iter()
        .filter_map(|sent| match sent {
            Sent::Text { text, .. } => Some(text),
            _ => None,
        })
        .collect()
}

#[rstest]
#[case::empty("")]
#[case::whitespace("   \n\t ")]
#[tokio::test]
async fn test_empty_text_gets_prompt(#[case] text: &str) {
    let (_tmp, store) = temp_store().await;
    let handler = handler(store, FakeFetcher::new(b"video".to_vec()));

    let outcome = handler.handle_text(CHAT, text, &CancellationToken::new()).await;
    assert!(matches!(outcome, Outcome::Empty));
    assert_eq!(texts(&handler), vec![SEND_LINK_PROMPT.to_string()]);
    assert_eq!(handler.coordinator().fetcher().calls(), 0);
}

#[rstest]
#[case::not_a_url("hello there", LinkError::NotAUrl)]
#[case::other_host("https://youtube.com/watch?v=abc", LinkError::HostNotAllowed)]
#[case::profile_page("https://www.tiktok.com/@someone", LinkError::UnrecognizedFormat)]
#[case::instagram_post("https://www.instagram.com/p/Cx9abc/", LinkError::UnrecognizedFormat)]
#[tokio::test]
async fn test_rejected_links(#[case] text: &str, #[case] expected: LinkError) {
    let (_tmp, store) = temp_store().await;
    let handler = handler(store, FakeFetcher::new(b"video".to_vec()));

    let outcome = handler.handle_text(CHAT, text, &CancellationToken::new()).await;
    match outcome {
        Outcome::Rejected(err) => assert_eq!(err, expected),
        other => panic!("expected rejection, got {:?}", other),
    }
    assert_eq!(texts(&handler), vec![expected.user_message().to_string()]);
    assert_eq!(handler.coordinator().fetcher().calls(), 0);
}

#[tokio::test]
async fn test_successful_delivery_sends_no_text() {
    let (_tmp, store) = temp_store().await;
    let handler = handler(store, FakeFetcher::new(b"video".to_vec()));

    let outcome = handler
        .handle_text(
            CHAT,
            "  https://www.tiktok.com/@someone/video/987  ",
            &CancellationToken::new(),
        )
        .await;
    assert!(matches!(
        outcome,
        Outcome::Delivered(Delivery::Uploaded { .. })
    ));
    assert!(texts(&handler).is_empty());
    assert_eq!(handler.coordinator().sink().visible().len(), 1);
}

#[tokio::test]
async fn test_fetch_failure_sends_single_text() {
    let (_tmp, store) = temp_store().await;
    let handler = handler(store, FakeFetcher::failing());

    let outcome = handler
        .handle_text(
            CHAT,
            "https://www.tiktok.com/@someone/video/987",
            &CancellationToken::new(),
        )
        .await;
    let err = match outcome {
        Outcome::Failed(err) => err,
        other => panic!("expected failure, got {:?}", other),
    };
    assert!(matches!(err, DownloadError::Fetch(_)));
    assert_eq!(handler.coordinator().sink().visible().len(), 1);
    assert_eq!(texts(&handler), vec![err.user_message().unwrap()]);
}

#[tokio::test]
async fn test_panic_is_contained() {
    let (_tmp, store) = temp_store().await;
    let handler = handler(store, FakeFetcher::panicking());

    let outcome = handler
        .handle_text(
            CHAT,
            "https://www.instagram.com/reel/Cx9abc/",
            &CancellationToken::new(),
        )
        .await;
    assert!(matches!(outcome, Outcome::Panicked));
    assert_eq!(texts(&handler), vec![INTERNAL_ERROR_MESSAGE.to_string()]);

    // handler keeps serving after a panic
    let outcome = handler
        .handle_text(CHAT, "not a link", &CancellationToken::new())
        .await;
    assert!(matches!(outcome, Outcome::Rejected(LinkError::NotAUrl)));
}

#[tokio::test]
async fn test_cancelled_request_sends_nothing() {
    let (_tmp, store) = temp_store().await;
    let handler = handler(
        store,
        FakeFetcher::new(b"video".to_vec()).slow(Duration::from_secs(30)),
    );
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = handler
        .handle_text(CHAT, "https://www.tiktok.com/@someone/video/987", &cancel)
        .await;
    assert!(matches!(outcome, Outcome::Failed(DownloadError::Cancelled)));
    assert!(handler.coordinator().sink().sent().is_empty());
}

#[tokio::test]
async fn test_share() {
    let (_tmp, store) = temp_store().await;
    let handler = handler(store, FakeFetcher::new(b"video".to_vec()));
    handler
        .handle_text(
            CHAT,
            "https://www.tiktok.com/@someone/video/987",
            &CancellationToken::new(),
        )
        .await;

    let record = handler.share(" tiktok:987 ").await.expect("shared record");
    assert_eq!(record.source_key.as_str(), "tiktok:987");
    assert_eq!(record.delivery_ref.id, "file-1");
    assert_eq!(record.hit_count, 1);

    assert!(handler.share("").await.is_none());
    assert!(handler.share("   ").await.is_none());
    assert!(handler.share("tiktok:404").await.is_none());
}
