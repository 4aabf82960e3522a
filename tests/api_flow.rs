mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::json;

use common::{TestApp, PASSWORD};
use crmserver::core::shared::enums::{Role, TicketStatus};
use crmserver::email::Notification;

#[tokio::test]
async fn test_customer_registration_and_login() {
    let app = TestApp::new();

    let res = app
        .post(
            "/api/auth/register/customer",
            None,
            json!({
                "firstName": "Ana",
                "lastName": "Lima",
                "email": "ana@example.com",
                "password": "pw-1",
                "phone": "555-0100"
            }),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["success"], true);
    assert_eq!(res.body["message"], "Registration successful");

    let sent = app.notifier.wait_for(1).await;
    assert_eq!(
        sent,
        vec![Notification::RegistrationConfirmation {
            to: "ana@example.com".to_string(),
            name: "Ana Lima".to_string(),
        }]
    );

    let res = app
        .post(
            "/api/auth/register/customer",
            None,
            json!({
                "firstName": "Ana",
                "lastName": "Lima",
                "email": "ana@example.com",
                "password": "pw-2"
            }),
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        res.body["message"],
        "Email already registered with password. Please use login instead."
    );

    let res = app
        .post(
            "/api/auth/login/customer",
            None,
            json!({"email": "ana@example.com", "password": "pw-1"}),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["success"], true);
    assert_eq!(res.body["role"], "CUSTOMER");
    assert!(res.body["token"].as_str().is_some_and(|t| !t.is_empty()));

    let res = app
        .post(
            "/api/auth/login/customer",
            None,
            json!({"email": "ana@example.com", "password": "pw-2"}),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["success"], false);
}

#[tokio::test]
async fn test_registration_missing_fields() {
    let app = TestApp::new();
    let res = app
        .post(
            "/api/auth/register/customer",
            None,
            json!({"firstName": "Ana", "email": "ana@example.com", "password": "pw"}),
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["message"], "Missing required fields");
}

#[tokio::test]
async fn test_registration_claims_staff_created_customer() {
    let app = TestApp::new();
    let id = app.seed_customer("Bruno Costa", "bruno@example.com").await;

    let res = app
        .post(
            "/api/auth/login/customer",
            None,
            json!({"email": "bruno@example.com", "password": "anything"}),
        )
        .await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    let res = app
        .post(
            "/api/auth/register/customer",
            None,
            json!({
                "firstName": "Bruno",
                "lastName": "Costa",
                "email": "BRUNO@example.com",
                "password": "pw-b"
            }),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);

    let res = app
        .post(
            "/api/auth/login/customer",
            None,
            json!({"email": "bruno@example.com", "password": "pw-b"}),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["id"], id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_registrations_claim_once() {
    let app = Arc::new(TestApp::new());
    let id = app.seed_customer("Bruno Costa", "bruno@example.com").await;

    let attempts = ["pw-first", "pw-second"].map(|password| {
        let app = app.clone();
        tokio::spawn(async move {
            app.post(
                "/api/auth/register/customer",
                None,
                json!({
                    "firstName": "Bruno",
                    "lastName": "Costa",
                    "email": "bruno@example.com",
                    "password": password
                }),
            )
            .await
            .status
        })
    });

    let mut statuses = Vec::new();
    for attempt in attempts {
        statuses.push(attempt.await.expect("join"));
    }
    statuses.sort_by_key(|s| s.as_u16());
    assert_eq!(statuses, vec![StatusCode::OK, StatusCode::BAD_REQUEST]);

    let customer = app
        .state
        .store
        .find_customer(id)
        .await
        .expect("find")
        .expect("exists");
    assert!(customer.has_password);
}

#[tokio::test]
async fn test_customer_login_unknown_email() {
    let app = TestApp::new();
    let res = app
        .post(
            "/api/auth/login/customer",
            None,
            json!({"email": "nobody@example.com", "password": "x"}),
        )
        .await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.body["success"], false);
}

#[tokio::test]
async fn test_employee_login() {
    let app = TestApp::new();
    let id = app
        .seed_employee("Ada Admin", "ada@crm.io", Role::Admin)
        .await;

    let res = app
        .post(
            "/api/auth/login/employee",
            None,
            json!({"email": "ada@crm.io", "password": PASSWORD}),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["id"], id);
    assert_eq!(res.body["role"], "ADMIN");

    let token = res.body["token"].as_str().expect("token").to_string();
    let claims = app.state.tokens.verify(&token).expect("valid token");
    assert_eq!(claims.sub, "ada@crm.io");
    assert_eq!(claims.role, Role::Admin);

    for (email, password) in [("ada@crm.io", "wrong"), ("ghost@crm.io", PASSWORD)] {
        let res = app
            .post(
                "/api/auth/login/employee",
                None,
                json!({"email": email, "password": password}),
            )
            .await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn test_resolution_workflow() {
    let app = TestApp::new();
    let employee = app
        .seed_employee("Eve Employee", "eve@crm.io", Role::Employee)
        .await;
    let admin = app
        .seed_employee("Ada Admin", "ada@crm.io", Role::Admin)
        .await;
    let ticket = app.seed_ticket("Printer jammed", None).await;
    let token = app.token_for("eve@crm.io", Role::Employee, employee);

    let body = json!({
        "originalTicketId": ticket,
        "title": "Printer fixed",
        "resolveDescription": "Cleared the paper path",
        "employeeId": employee,
        "adminId": admin
    });

    let res = app
        .post("/api/resolved-tickets", Some(&token), body.clone())
        .await;
    assert_eq!(res.status, StatusCode::CREATED);
    assert_eq!(res.body["originalTicketId"], ticket);
    assert_eq!(res.body["employeeName"], "Eve Employee");
    assert_eq!(res.body["adminName"], "Ada Admin");
    assert_eq!(res.body["ticketDescription"], "Printer jammed (reported)");

    let res = app.get(&format!("/api/tickets/{ticket}"), Some(&token)).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["status"], "RESOLVED");

    let res = app
        .get(
            &format!("/api/resolved-tickets/original-ticket/{ticket}"),
            Some(&token),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["title"], "Printer fixed");

    let res = app
        .get(&format!("/api/resolved-tickets/employee/{employee}"), Some(&token))
        .await;
    assert_eq!(res.body.as_array().map(Vec::len), Some(1));

    let res = app
        .post("/api/resolved-tickets", Some(&token), body)
        .await;
    assert_eq!(res.status, StatusCode::CONFLICT);

    let all = app.state.store.list_resolutions().await.expect("list");
    assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn test_resolution_for_missing_ticket_changes_nothing() {
    let app = TestApp::new();
    let employee = app
        .seed_employee("Eve Employee", "eve@crm.io", Role::Employee)
        .await;
    let admin = app
        .seed_employee("Ada Admin", "ada@crm.io", Role::Admin)
        .await;
    let token = app.token_for("eve@crm.io", Role::Employee, employee);

    let res = app
        .post(
            "/api/resolved-tickets",
            Some(&token),
            json!({
                "originalTicketId": 9999,
                "title": "Ghost",
                "ticketDescription": "n/a",
                "resolveDescription": "n/a",
                "employeeId": employee,
                "adminId": admin
            }),
        )
        .await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert!(app
        .state
        .store
        .list_resolutions()
        .await
        .expect("list")
        .is_empty());
}

#[tokio::test]
async fn test_resolution_signed_off_by_plain_employee() {
    let app = TestApp::new();
    let employee = app
        .seed_employee("Eve Employee", "eve@crm.io", Role::Employee)
        .await;
    let ticket = app.seed_ticket("Laptop slow", None).await;
    let token = app.token_for("eve@crm.io", Role::Employee, employee);

    let res = app
        .post(
            "/api/resolved-tickets",
            Some(&token),
            json!({
                "originalTicketId": ticket,
                "title": "Done",
                "resolveDescription": "Reinstalled",
                "employeeId": employee,
                "adminId": employee
            }),
        )
        .await;
    assert_eq!(res.status, StatusCode::CREATED);
    assert_eq!(res.body["adminId"], employee);
    assert_eq!(res.body["adminName"], "Eve Employee");

    let stored = app
        .state
        .store
        .find_ticket(ticket)
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(stored.status, TicketStatus::Resolved);
}

#[tokio::test]
async fn test_resolution_with_unknown_admin_leaves_ticket_open() {
    let app = TestApp::new();
    let employee = app
        .seed_employee("Eve Employee", "eve@crm.io", Role::Employee)
        .await;
    let ticket = app.seed_ticket("Laptop slow", None).await;
    let token = app.token_for("eve@crm.io", Role::Employee, employee);

    let res = app
        .post(
            "/api/resolved-tickets",
            Some(&token),
            json!({
                "originalTicketId": ticket,
                "title": "Done",
                "resolveDescription": "Reinstalled",
                "employeeId": employee,
                "adminId": 777
            }),
        )
        .await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);

    let stored = app
        .state
        .store
        .find_ticket(ticket)
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(stored.status, TicketStatus::Open);
}

#[tokio::test]
async fn test_overlong_resolution_is_bad_request() {
    let app = TestApp::new();
    let employee = app
        .seed_employee("Eve Employee", "eve@crm.io", Role::Employee)
        .await;
    let ticket = app.seed_ticket("Laptop slow", None).await;
    let token = app.token_for("eve@crm.io", Role::Employee, employee);

    let res = app
        .post(
            "/api/resolved-tickets",
            Some(&token),
            json!({
                "originalTicketId": ticket,
                "title": "Done",
                "ticketDescription": "d".repeat(1001),
                "resolveDescription": "Reinstalled",
                "employeeId": employee,
                "adminId": employee
            }),
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        res.body["message"],
        "ticketDescription must be at most 1000 characters"
    );
    assert!(app
        .state
        .store
        .list_resolutions()
        .await
        .expect("list")
        .is_empty());
}

#[tokio::test]
async fn test_employee_on_resolution_cannot_be_deleted() {
    let app = TestApp::new();
    let admin = app
        .seed_employee("Ada Admin", "ada@crm.io", Role::Admin)
        .await;
    let employee = app
        .seed_employee("Eve Employee", "eve@crm.io", Role::Employee)
        .await;
    let ticket = app.seed_ticket("Printer jammed", None).await;
    let admin_token = app.token_for("ada@crm.io", Role::Admin, admin);

    let res = app
        .post(
            "/api/resolved-tickets",
            Some(&admin_token),
            json!({
                "originalTicketId": ticket,
                "title": "Printer fixed",
                "resolveDescription": "Cleared the paper path",
                "employeeId": employee,
                "adminId": admin
            }),
        )
        .await;
    assert_eq!(res.status, StatusCode::CREATED);
    let resolution = res.body["id"].as_i64().expect("id");

    let res = app
        .delete(&format!("/api/employees/{employee}"), Some(&admin_token))
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let res = app
        .get(&format!("/api/resolved-tickets/{resolution}"), Some(&admin_token))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["employeeId"], employee);
    assert_eq!(res.body["employeeName"], "Eve Employee");

    // Staff with no resolutions can still be removed.
    let spare = app
        .seed_employee("Sam Spare", "sam@crm.io", Role::Employee)
        .await;
    let res = app
        .delete(&format!("/api/employees/{spare}"), Some(&admin_token))
        .await;
    assert_eq!(res.status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_overlong_staff_and_ticket_fields_are_bad_request() {
    let app = TestApp::new();
    let admin = app
        .seed_employee("Ada Admin", "ada@crm.io", Role::Admin)
        .await;
    let token = app.token_for("ada@crm.io", Role::Admin, admin);

    let res = app
        .post(
            "/api/employees",
            Some(&token),
            json!({"name": "n".repeat(256), "email": "long@crm.io"}),
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let res = app
        .post(
            "/api/customers",
            Some(&token),
            json!({"name": "Acme", "email": "ops@acme.io", "phoneNumber": "1".repeat(51)}),
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let res = app
        .post("/api/tickets", Some(&token), json!({"title": "t".repeat(256)}))
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["message"], "title must be at most 255 characters");

    let res = app
        .post("/api/categories", Some(&token), json!({"name": "c".repeat(256)}))
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_auth_gate() {
    let app = TestApp::new();
    let customer = app.seed_customer("Carla", "carla@example.com").await;

    let res = app.get("/api/resolved-tickets", None).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    let customer_token = app.token_for("carla@example.com", Role::Customer, customer);
    let res = app.get("/api/resolved-tickets", Some(&customer_token)).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    let token = app.token_for("x@crm.io", Role::Admin, 1);
    let at = token.rfind('.').expect("signature") + 5;
    let flipped = if &token[at..at + 1] == "A" { "B" } else { "A" };
    let tampered = format!("{}{}{}", &token[..at], flipped, &token[at + 1..]);
    let res = app.get("/api/resolved-tickets", Some(&tampered)).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    let res = app.get("/api/health", Some(&tampered)).await;
    assert_eq!(res.status, StatusCode::OK);
}

#[tokio::test]
async fn test_customer_sees_only_own_tickets() {
    let app = TestApp::new();
    let carla = app.seed_customer("Carla", "carla@example.com").await;
    let dan = app.seed_customer("Dan", "dan@example.com").await;
    app.seed_ticket("Carla's ticket", Some(carla)).await;
    let dans = app.seed_ticket("Dan's ticket", Some(dan)).await;
    let token = app.token_for("carla@example.com", Role::Customer, carla);

    let res = app.get("/api/tickets", Some(&token)).await;
    assert_eq!(res.status, StatusCode::OK);
    let tickets = res.body.as_array().expect("array");
    assert_eq!(tickets.len(), 1);
    assert_eq!(tickets[0]["customerId"], carla);

    let res = app.get(&format!("/api/tickets/{dans}"), Some(&token)).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    let res = app
        .post(
            "/api/tickets",
            Some(&token),
            json!({"title": "New issue", "customerId": dan}),
        )
        .await;
    assert_eq!(res.status, StatusCode::CREATED);
    assert_eq!(res.body["customerId"], carla);
    assert_eq!(res.body["status"], "OPEN");
}

#[tokio::test]
async fn test_status_update_cannot_resolve() {
    let app = TestApp::new();
    let employee = app
        .seed_employee("Eve Employee", "eve@crm.io", Role::Employee)
        .await;
    let ticket = app.seed_ticket("Mouse broken", None).await;
    let token = app.token_for("eve@crm.io", Role::Employee, employee);

    let res = app
        .put(
            &format!("/api/tickets/{ticket}/status"),
            Some(&token),
            json!({"status": "RESOLVED"}),
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let res = app
        .put(
            &format!("/api/tickets/{ticket}/status"),
            Some(&token),
            json!({"status": "IN_PROGRESS"}),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["status"], "IN_PROGRESS");
}

#[tokio::test]
async fn test_staff_sets_customer_password() {
    let app = TestApp::new();
    let admin = app
        .seed_employee("Ada Admin", "ada@crm.io", Role::Admin)
        .await;
    let customer = app.seed_customer("Fay", "fay@example.com").await;
    let token = app.token_for("ada@crm.io", Role::Admin, admin);

    let res = app
        .put(
            &format!("/api/customers/{customer}/password"),
            Some(&token),
            json!({"password": "fresh-pw", "sendEmail": true}),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["hasPassword"], true);
    assert!(res.body.get("passwordHash").is_none());

    let sent = app.notifier.wait_for(1).await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind(), "password_set");

    let res = app
        .post(
            "/api/auth/login/customer",
            None,
            json!({"email": "fay@example.com", "password": "fresh-pw"}),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
}

#[tokio::test]
async fn test_category_catalog() {
    let app = TestApp::new();
    let employee = app
        .seed_employee("Eve Employee", "eve@crm.io", Role::Employee)
        .await;
    let token = app.token_for("eve@crm.io", Role::Employee, employee);

    for name in ["Hardware", "Software", "Billing"] {
        let res = app
            .post("/api/categories", Some(&token), json!({"name": name}))
            .await;
        assert_eq!(res.status, StatusCode::CREATED);
    }
    let res = app
        .post("/api/categories", Some(&token), json!({"name": "Billing"}))
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let res = app
        .get("/api/categories/search?name=WARE", Some(&token))
        .await;
    let names: Vec<&str> = res
        .body
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|c| c["name"].as_str())
        .collect();
    assert_eq!(names, vec!["Hardware", "Software"]);
}
