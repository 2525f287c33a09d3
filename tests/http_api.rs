use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use ulid::Ulid;

use staybook::auth::{USER_ID_HEADER, USER_ROLE_HEADER};
use staybook::engine::Engine;
use staybook::notify::{Message, TopicHub, BOOKING_EVENTS_TOPIC};

// ── Test infrastructure ──────────────────────────────────────

struct TestServer {
    base: String,
    client: Client,
    events: broadcast::Receiver<Message>,
}

async fn start_test_server() -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();

    let dir = std::env::temp_dir().join(format!("staybook_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let hub = Arc::new(TopicHub::new());
    let events = hub.subscribe(BOOKING_EVENTS_TOPIC);
    let engine = Arc::new(Engine::new(dir.join("staybook.wal"), hub).unwrap());

    tokio::spawn(async move {
        let _ = axum::serve(listener, staybook::http::router(engine)).await;
    });

    TestServer {
        base: format!("http://{addr}"),
        client: Client::new(),
        events,
    }
}

#[derive(Clone, Copy)]
struct Session {
    id: Ulid,
    role: &'static str,
}

impl Session {
    fn owner() -> Self {
        Self { id: Ulid::new(), role: "owner" }
    }

    fn traveler() -> Self {
        Self { id: Ulid::new(), role: "traveler" }
    }
}

impl TestServer {
    async fn send(
        &self,
        method: reqwest::Method,
        path: &str,
        session: Option<Session>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = self.client.request(method, format!("{}{path}", self.base));
        if let Some(s) = session {
            req = req
                .header(USER_ID_HEADER, s.id.to_string())
                .header(USER_ROLE_HEADER, s.role);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }
        let resp = req.send().await.unwrap();
        let status = resp.status();
        let body = resp.json::<Value>().await.unwrap_or(Value::Null);
        (status, body)
    }

    async fn get(&self, path: &str, session: Option<Session>) -> (StatusCode, Value) {
        self.send(reqwest::Method::GET, path, session, None).await
    }

    async fn post(&self, path: &str, session: Session, body: Value) -> (StatusCode, Value) {
        self.send(reqwest::Method::POST, path, Some(session), Some(body)).await
    }

    async fn put(&self, path: &str, session: Session) -> (StatusCode, Value) {
        self.send(reqwest::Method::PUT, path, Some(session), None).await
    }

    async fn create_listing(&self, owner: Session, max_guests: u32, price: u32) -> String {
        let (status, body) = self
            .post(
                "/owner/listings",
                owner,
                json!({
                    "title": "Cabin by the lake",
                    "city": "Tahoe",
                    "pricePerNight": price,
                    "maxGuests": max_guests,
                    "amenities": ["wifi", "fireplace"],
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["listing"]["id"].as_str().unwrap().to_string()
    }

    async fn book(
        &self,
        traveler: Session,
        listing_id: &str,
        check_in: &str,
        check_out: &str,
        guests: u32,
    ) -> (StatusCode, Value) {
        self.post(
            "/bookings",
            traveler,
            json!({
                "listingId": listing_id,
                "checkIn": check_in,
                "checkOut": check_out,
                "guests": guests,
            }),
        )
        .await
    }

    async fn next_event(&mut self) -> Value {
        let message = tokio::time::timeout(Duration::from_secs(2), self.events.recv())
            .await
            .expect("timed out waiting for booking event")
            .unwrap();
        assert_eq!(message.topic, BOOKING_EVENTS_TOPIC);
        serde_json::from_str(&message.value).unwrap()
    }
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn booking_lifecycle_over_http() {
    let mut server = start_test_server().await;
    let owner = Session::owner();
    let traveler = Session::traveler();
    let listing_id = server.create_listing(owner, 4, 100).await;

    let (status, body) = server
        .book(traveler, &listing_id, "2025-03-01", "2025-03-04", 2)
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let booking = &body["booking"];
    assert_eq!(booking["totalPrice"], "300");
    assert_eq!(booking["status"], "pending");
    assert_eq!(booking["listing"]["id"], listing_id.as_str());
    let booking_id = booking["id"].as_str().unwrap().to_string();

    let event = server.next_event().await;
    assert_eq!(event["eventType"], "BOOKING_CREATED");
    assert_eq!(event["data"]["id"], booking_id.as_str());

    // Only the owner may accept.
    let (status, _) = server.put(&format!("/bookings/{booking_id}/accept"), traveler).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = server.put(&format!("/bookings/{booking_id}/accept"), owner).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["booking"]["status"], "accepted");
    assert_eq!(body["message"], "Booking accepted and dates blocked");

    let event = server.next_event().await;
    assert_eq!(event["eventType"], "BOOKING_STATUS_UPDATED");
    assert_eq!(event["data"]["status"], "accepted");
    assert_eq!(event["data"]["ownerId"], owner.id.to_string());

    let (status, body) = server.put(&format!("/bookings/{booking_id}/accept"), owner).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_STATE");
    assert_eq!(body["error"], "cannot accept booking with status: accepted");

    let (_, detail) = server.get(&format!("/listings/{listing_id}"), None).await;
    assert_eq!(
        detail["listing"]["unavailableDates"],
        json!([{ "checkIn": "2025-03-01", "checkOut": "2025-03-04" }])
    );

    let (status, body) = server
        .book(Session::traveler(), &listing_id, "2025-03-03", "2025-03-05", 1)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "DATES_UNAVAILABLE");

    let (status, body) = server.put(&format!("/bookings/{booking_id}/cancel"), traveler).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["booking"]["status"], "cancelled");

    let (_, detail) = server.get(&format!("/listings/{listing_id}"), None).await;
    assert_eq!(detail["listing"]["blockedDates"], json!([]));
}

#[tokio::test]
async fn create_booking_errors() {
    let server = start_test_server().await;
    let owner = Session::owner();
    let listing_id = server.create_listing(owner, 4, 100).await;

    let (status, body) = server
        .book(Session::traveler(), &listing_id, "2025-03-01", "2025-03-04", 5)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "CAPACITY_EXCEEDED");
    assert_eq!(body["error"], "property allows maximum 4 guests");

    let (status, body) = server
        .book(Session::traveler(), &listing_id, "2025-03-04", "2025-03-01", 1)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_DATE_RANGE");

    let (status, body) = server
        .book(owner, &listing_id, "2025-03-01", "2025-03-04", 1)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_OPERATION");

    let (status, body) = server
        .book(Session::traveler(), &Ulid::new().to_string(), "2025-03-01", "2025-03-04", 1)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, body) = server
        .book(Session::traveler(), &listing_id, "03/01/2025", "2025-03-04", 1)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");

    let (status, _) = server
        .send(
            reqwest::Method::POST,
            "/bookings",
            None,
            Some(json!({ "listingId": listing_id })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn availability_endpoint() {
    let server = start_test_server().await;
    let owner = Session::owner();
    let listing_id = server.create_listing(owner, 3, 90).await;

    let path = format!("/listings/{listing_id}/availability?checkIn=2025-05-01&checkOut=2025-05-03");
    let (status, body) = server.get(&path, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available"], true);
    assert_eq!(body["pricePerNight"], "90");
    assert_eq!(body["maxGuests"], 3);

    let (_, booked) = server
        .book(Session::traveler(), &listing_id, "2025-05-02", "2025-05-04", 1)
        .await;
    let booking_id = booked["booking"]["id"].as_str().unwrap();
    server.put(&format!("/bookings/{booking_id}/accept"), owner).await;

    let (_, body) = server.get(&path, None).await;
    assert_eq!(body["available"], false);
    assert_eq!(body["reason"], "Dates already booked");

    let inverted = format!("/listings/{listing_id}/availability?checkIn=2025-05-03&checkOut=2025-05-01");
    let (status, body) = server.get(&inverted, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available"], false);
    assert_eq!(body["reason"], "Invalid date range");

    let (status, _) = server
        .get(&format!("/listings/{listing_id}/availability?checkIn=2025-05-03"), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn search_and_owner_views() {
    let server = start_test_server().await;
    let owner = Session::owner();
    let first = server.create_listing(owner, 2, 80).await;
    let second = server.create_listing(owner, 6, 250).await;

    let (status, body) = server.get("/listings?location=tahoe&guests=4", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["count"], 1);
    assert_eq!(body["listings"][0]["id"], second.as_str());

    let (_, body) = server.get("/listings?maxPrice=100", None).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["listings"][0]["id"], first.as_str());

    let (status, body) = server
        .get("/listings?checkIn=2025-05-03&checkOut=2025-05-01", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_DATE_RANGE");

    let (status, body) = server.get("/owner/listings", Some(owner)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["listings"].as_array().unwrap().len(), 2);

    let (status, _) = server.get("/owner/listings", Some(Session::traveler())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn booking_queries_and_favorites() {
    let server = start_test_server().await;
    let owner = Session::owner();
    let traveler = Session::traveler();
    let listing_id = server.create_listing(owner, 4, 100).await;

    let (_, a) = server
        .book(traveler, &listing_id, "2025-01-01", "2025-01-03", 1)
        .await;
    let (_, b) = server
        .book(traveler, &listing_id, "2025-02-01", "2025-02-03", 1)
        .await;
    let a_id = a["booking"]["id"].as_str().unwrap().to_string();
    let b_id = b["booking"]["id"].as_str().unwrap().to_string();
    server.put(&format!("/bookings/{a_id}/accept"), owner).await;
    server.put(&format!("/bookings/{b_id}/reject"), owner).await;

    let (_, mine) = server.get("/bookings/my", Some(traveler)).await;
    assert_eq!(mine["count"], 2);

    let (_, hosted) = server.get("/bookings?status=accepted", Some(owner)).await;
    let hosted = hosted["bookings"].as_array().unwrap();
    assert_eq!(hosted.len(), 1);
    assert_eq!(hosted[0]["id"], a_id.as_str());

    let (_, history) = server.get("/bookings/history/traveler", Some(traveler)).await;
    assert_eq!(history["bookings"].as_array().unwrap().len(), 1);

    let (status, _) = server
        .get(&format!("/bookings/{a_id}"), Some(Session::traveler()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = server
        .post("/favorites", traveler, json!({ "listingId": listing_id }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = server
        .post("/favorites", traveler, json!({ "listingId": listing_id }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "already in favorites");

    let (_, check) = server
        .get(&format!("/favorites/check/{listing_id}"), Some(traveler))
        .await;
    assert_eq!(check["isFavorite"], true);

    let (_, favorites) = server.get("/favorites", Some(traveler)).await;
    assert_eq!(favorites["count"], 1);

    let (status, _) = server
        .send(
            reqwest::Method::DELETE,
            &format!("/favorites/{listing_id}"),
            Some(traveler),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, check) = server
        .get(&format!("/favorites/check/{listing_id}"), Some(traveler))
        .await;
    assert_eq!(check["isFavorite"], false);
}

#[tokio::test]
async fn users_and_listing_management() {
    let server = start_test_server().await;

    let (status, body) = server
        .send(
            reqwest::Method::POST,
            "/users",
            None,
            Some(json!({ "name": "Dana", "email": "dana@example.com", "role": "owner" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let user_id = body["user"]["id"].as_str().unwrap().to_string();

    let (status, body) = server.get(&format!("/users/{user_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], "dana@example.com");

    let owner = Session {
        id: user_id.parse().unwrap(),
        role: "owner",
    };
    let listing_id = server.create_listing(owner, 2, 100).await;
    let (_, detail) = server.get(&format!("/listings/{listing_id}"), None).await;
    assert_eq!(detail["listing"]["owner"]["name"], "Dana");

    let (status, body) = server
        .send(
            reqwest::Method::PUT,
            &format!("/owner/listings/{listing_id}"),
            Some(owner),
            Some(json!({ "pricePerNight": 120.5, "status": "inactive" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["listing"]["pricePerNight"], "120.5");
    assert_eq!(body["listing"]["status"], "inactive");

    let (status, _) = server
        .send(
            reqwest::Method::DELETE,
            &format!("/owner/listings/{listing_id}"),
            Some(Session::owner()),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = server
        .send(
            reqwest::Method::DELETE,
            &format!("/owner/listings/{listing_id}"),
            Some(owner),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = server.get(&format!("/listings/{listing_id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn owner_listing_detail_and_profile() {
    let server = start_test_server().await;

    let (_, body) = server
        .send(
            reqwest::Method::POST,
            "/users",
            None,
            Some(json!({ "name": "Finn", "email": "finn@example.com" })),
        )
        .await;
    let traveler = Session {
        id: body["user"]["id"].as_str().unwrap().parse().unwrap(),
        role: "traveler",
    };
    let owner = Session::owner();
    let listing_id = server.create_listing(owner, 2, 100).await;
    let (_, booked) = server
        .book(traveler, &listing_id, "2025-06-01", "2025-06-04", 2)
        .await;

    let (status, body) = server
        .get(&format!("/owner/listings/{listing_id}"), Some(owner))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["listing"]["id"], listing_id.as_str());
    let bookings = body["listing"]["bookings"].as_array().unwrap();
    assert_eq!(bookings.len(), 1);
    assert_eq!(bookings[0]["id"], booked["booking"]["id"]);
    assert_eq!(bookings[0]["traveler"]["name"], "Finn");

    let (status, _) = server
        .get(&format!("/owner/listings/{listing_id}"), Some(Session::owner()))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = server
        .get(&format!("/owner/listings/{listing_id}"), Some(traveler))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // A traveler asking for the owner side still gets their own bookings.
    let (_, listed) = server.get("/bookings?role=owner", Some(traveler)).await;
    assert_eq!(listed["bookings"].as_array().unwrap().len(), 1);

    let (status, body) = server.get("/profile", Some(traveler)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], "finn@example.com");

    let (status, body) = server
        .send(
            reqwest::Method::PUT,
            "/profile",
            Some(traveler),
            Some(json!({ "name": "Finn O.", "city": "Dublin", "phone": "" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["user"]["name"], "Finn O.");
    assert_eq!(body["user"]["city"], "Dublin");
    assert_eq!(body["user"]["phone"], Value::Null);

    let (status, _) = server.get("/profile", Some(Session::traveler())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = server.get("/profile", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
