use std::io::Read;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use providers::{
    CheckoutRequest, DonorInfo, MailchimpList, MailingList, NewMember, PaymentProvider,
    ProviderError, StripeCheckout,
};
use tiny_http::{Header, Response, Server};

struct Captured {
    method: String,
    url: String,
    authorization: Option<String>,
    content_type: Option<String>,
    body: String,
}

/// Serves exactly one request with `status`/`body` and reports what it saw.
fn serve_once(status: u16, body: &'static str) -> (String, mpsc::Receiver<Captured>) {
    let server = Server::http("127.0.0.1:0").expect("bind fake upstream");
    let port = server.server_addr().to_ip().expect("ip listener").port();
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let Ok(mut request) = server.recv() else {
            return;
        };
        let header = |name: &'static str| {
            request
                .headers()
                .iter()
                .find(|header| header.field.equiv(name))
                .map(|header| header.value.as_str().to_string())
        };
        let authorization = header("Authorization");
        let content_type = header("Content-Type");
        let mut text = String::new();
        request
            .as_reader()
            .read_to_string(&mut text)
            .expect("read body");
        let captured = Captured {
            method: request.method().to_string(),
            url: request.url().to_string(),
            authorization,
            content_type,
            body: text,
        };
        let response = Response::from_string(body)
            .with_status_code(status)
            .with_header(
                Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                    .expect("header"),
            );
        request.respond(response).expect("respond");
        tx.send(captured).expect("report request");
    });
    (format!("http://127.0.0.1:{port}"), rx)
}

fn timeout() -> Duration {
    Duration::from_secs(5)
}

#[test]
fn stripe_checkout_posts_form_with_bearer_key() {
    let (base, seen) = serve_once(
        200,
        r#"{"id":"cs_test_1","url":"https://checkout.stripe.com/c/pay/cs_test_1","object":"checkout.session"}"#,
    );
    let stripe = StripeCheckout::new("sk_test_abc", base, timeout()).expect("client");
    let request = CheckoutRequest::donation(
        12.34,
        "usd",
        "https://everybodyscool.org",
        DonorInfo {
            name: Some("Ada Lovelace".into()),
            email: Some("ada@example.org".into()),
            message: Some("Go team!".into()),
        },
    );
    let session = stripe.create_checkout_session(&request).expect("session");
    assert_eq!(session.id, "cs_test_1");
    assert_eq!(
        session.url.as_deref(),
        Some("https://checkout.stripe.com/c/pay/cs_test_1")
    );

    let captured = seen.recv_timeout(timeout()).expect("request");
    assert_eq!(captured.method, "POST");
    assert_eq!(captured.url, "/v1/checkout/sessions");
    assert_eq!(captured.authorization.as_deref(), Some("Bearer sk_test_abc"));
    assert!(captured
        .content_type
        .as_deref()
        .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded")));
    assert!(captured
        .body
        .contains("line_items%5B0%5D%5Bprice_data%5D%5Bunit_amount%5D=1234"));
    assert!(captured.body.contains("metadata%5BdonorName%5D=Ada+Lovelace"));
    assert!(captured.body.contains("mode=payment"));
}

#[test]
fn stripe_failure_carries_upstream_message() {
    let (base, _seen) = serve_once(
        402,
        r#"{"error":{"message":"Your card was declined.","type":"card_error"}}"#,
    );
    let stripe = StripeCheckout::new("sk_test_abc", base, timeout()).expect("client");
    let request = CheckoutRequest::donation(5.0, "usd", "https://x.org", DonorInfo::default());
    match stripe.create_checkout_session(&request) {
        Err(ProviderError::Upstream {
            provider,
            status,
            message,
        }) => {
            assert_eq!(provider, "stripe");
            assert_eq!(status, 402);
            assert_eq!(message, "Your card was declined.");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn mailchimp_member_is_posted_as_json() {
    let (base, seen) = serve_once(200, r#"{"id":"8a25ff1d98","status":"subscribed"}"#);
    let list = MailchimpList::new("key-us1", base, timeout()).expect("client");
    let mut member = NewMember::new("grace@example.org");
    member.first_name = Some("Grace".into());
    let membership = list.add_member("abc123", &member).expect("member");
    assert_eq!(membership.id, "8a25ff1d98");

    let captured = seen.recv_timeout(timeout()).expect("request");
    assert_eq!(captured.url, "/3.0/lists/abc123/members");
    assert!(captured
        .authorization
        .as_deref()
        .is_some_and(|value| value.starts_with("Basic ")));
    let body: serde_json::Value = serde_json::from_str(&captured.body).expect("json body");
    assert_eq!(body["email_address"], "grace@example.org");
    assert_eq!(body["status"], "subscribed");
    assert_eq!(body["merge_fields"]["FNAME"], "Grace");
    assert_eq!(body["merge_fields"]["LNAME"], "");
    assert_eq!(body["tags"][0], "fundraiser-donor");
}

#[test]
fn mailchimp_duplicate_member_is_distinguished() {
    let (base, _seen) = serve_once(
        400,
        r#"{"type":"https://mailchimp.com/developer/marketing/docs/errors/","title":"Member Exists","status":400,"detail":"grace@example.org is already a list member."}"#,
    );
    let list = MailchimpList::new("key-us1", base, timeout()).expect("client");
    let err = list
        .add_member("abc123", &NewMember::new("grace@example.org"))
        .unwrap_err();
    assert!(matches!(err, ProviderError::MemberExists));
}
