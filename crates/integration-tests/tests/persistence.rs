//! Service-level writes checked against a migrated database.
//!
//! These tests require a migrated `PostgreSQL` database (`fm-cli migrate`).
//! Each test creates its own user, product, and coupon rows.
//!
//! Run with: `DATABASE_URL=postgres://... cargo test -p freshmilk-integration-tests --test persistence -- --ignored`

#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::{Duration, Local, Utc};
use freshmilk_api::error::AppError;
use freshmilk_api::models::order::{CreateOrder, OrderLineInput};
use freshmilk_api::models::subscription::CreateSubscription;
use freshmilk_api::models::user::CurrentUser;
use freshmilk_api::services::auth::jwt::TokenType;
use freshmilk_api::db::membership::MembershipRepository;
use freshmilk_api::services::coupons::CouponService;
use freshmilk_api::services::membership::MembershipService;
use freshmilk_api::services::orders::OrderService;
use freshmilk_api::services::subscriptions::SubscriptionService;
use freshmilk_core::{
    CouponId, DocumentPrefix, MemberLevel, Membership, MembershipPlanId, OrderStatus,
    PaymentMethod, ProductId,
    SubscriptionFrequency, SubscriptionPricing, SubscriptionStatus, UserId,
};
use freshmilk_integration_tests::{app_with_pool, database_pool, token_for};
use sqlx::PgPool;
use tower::ServiceExt;
use uuid::Uuid;

fn unique(prefix: &str) -> String {
    format!("{prefix}_{}", &Uuid::new_v4().simple().to_string()[..12])
}

async fn create_customer(pool: &PgPool) -> CurrentUser {
    let username = unique("it");
    let id: i32 = sqlx::query_scalar("INSERT INTO shop.user (username) VALUES ($1) RETURNING id")
        .bind(&username)
        .fetch_one(pool)
        .await
        .expect("insert user");
    CurrentUser {
        id: UserId::new(id),
        username,
        is_admin: false,
        membership: Membership::new(MemberLevel::Regular, None),
        courier_id: None,
    }
}

async fn create_product(pool: &PgPool, stock: i32, is_subscription: bool) -> ProductId {
    let id: i32 = sqlx::query_scalar(
        r"
        INSERT INTO shop.product (name, price, stock, is_subscription)
        VALUES ($1, 12.50, $2, $3)
        RETURNING id
        ",
    )
    .bind(unique("鲜牛奶"))
    .bind(stock)
    .bind(is_subscription)
    .fetch_one(pool)
    .await
    .expect("insert product");
    ProductId::new(id)
}

async fn stock_of(pool: &PgPool, product_id: ProductId) -> i32 {
    sqlx::query_scalar("SELECT stock FROM shop.product WHERE id = $1")
        .bind(product_id)
        .fetch_one(pool)
        .await
        .expect("read stock")
}

fn order_for(items: &[(ProductId, i32)]) -> CreateOrder {
    CreateOrder {
        items: items
            .iter()
            .map(|&(product_id, quantity)| OrderLineInput {
                product_id,
                quantity,
            })
            .collect(),
        address_id: None,
        receiver_name: Some("张三".to_owned()),
        receiver_phone: Some("13800138000".to_owned()),
        receiver_address: Some("上海市浦东新区世纪大道100号".to_owned()),
        remark: String::new(),
        user_coupon_id: None,
    }
}

fn is_bad_request(err: &AppError) -> bool {
    err.status() == StatusCode::BAD_REQUEST
}

// ============================================================================
// Checkout
// ============================================================================

#[tokio::test]
#[ignore = "Requires migrated database"]
async fn test_repeated_lines_over_stock_are_rejected() {
    let pool = database_pool().await;
    let user = create_customer(&pool).await;
    let milk = create_product(&pool, 6, false).await;

    let err = OrderService::new(&pool)
        .create(&user, &order_for(&[(milk, 5), (milk, 5)]))
        .await
        .expect_err("combined quantity exceeds stock");

    assert!(is_bad_request(&err), "unexpected error: {err:?}");
    assert_eq!(stock_of(&pool, milk).await, 6);
}

#[tokio::test]
#[ignore = "Requires migrated database"]
async fn test_short_second_line_leaves_first_stock_untouched() {
    let pool = database_pool().await;
    let user = create_customer(&pool).await;
    let milk = create_product(&pool, 10, false).await;
    let yogurt = create_product(&pool, 1, false).await;

    let err = OrderService::new(&pool)
        .create(&user, &order_for(&[(milk, 3), (yogurt, 2)]))
        .await
        .expect_err("second line exceeds stock");

    assert!(is_bad_request(&err), "unexpected error: {err:?}");
    assert_eq!(stock_of(&pool, milk).await, 10);
    assert_eq!(stock_of(&pool, yogurt).await, 1);
}

#[tokio::test]
#[ignore = "Requires migrated database"]
async fn test_repeated_lines_within_stock_are_accepted() {
    let pool = database_pool().await;
    let user = create_customer(&pool).await;
    let milk = create_product(&pool, 6, false).await;

    let detail = OrderService::new(&pool)
        .create(&user, &order_for(&[(milk, 3), (milk, 3)]))
        .await
        .unwrap();

    assert_eq!(detail.order.status, OrderStatus::Pending);
    assert_eq!(stock_of(&pool, milk).await, 0);
}

#[tokio::test]
#[ignore = "Requires migrated database"]
async fn test_paying_twice_records_one_payment() {
    let pool = database_pool().await;
    let user = create_customer(&pool).await;
    let milk = create_product(&pool, 5, false).await;
    let service = OrderService::new(&pool);

    let detail = service
        .create(&user, &order_for(&[(milk, 2)]))
        .await
        .unwrap();
    let paid = service
        .pay(user.id, detail.order.id, Some(PaymentMethod::Sandbox))
        .await
        .unwrap();
    assert_eq!(paid.status, OrderStatus::Paid);

    let again = service.pay(user.id, detail.order.id, None).await;
    assert!(again.is_err_and(|e| is_bad_request(&e)));

    let payments: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM shop.payment WHERE order_id = $1")
        .bind(detail.order.id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(payments, 1);
}

// ============================================================================
// Coupons
// ============================================================================

#[tokio::test]
#[ignore = "Requires migrated database"]
async fn test_receive_stops_at_per_user_limit() {
    let pool = database_pool().await;
    let user = create_customer(&pool).await;
    let id: i32 = sqlx::query_scalar(
        r"
        INSERT INTO shop.coupon
            (code, name, coupon_type, discount_amount, total_count, per_user_limit,
             start_time, end_time)
        VALUES ($1, '满减券', 'amount', 5, 10, 1, $2, $3)
        RETURNING id
        ",
    )
    .bind(unique("FM"))
    .bind(Utc::now() - Duration::days(1))
    .bind(Utc::now() + Duration::days(1))
    .fetch_one(&pool)
    .await
    .expect("insert coupon");
    let coupon_id = CouponId::new(id);
    let service = CouponService::new(&pool);

    let first = service.receive(user.id, coupon_id).await.unwrap();
    assert_eq!(first.coupon_id, coupon_id);

    let second = service.receive(user.id, coupon_id).await;
    assert!(second.is_err_and(|e| is_bad_request(&e)));

    let held: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM shop.user_coupon WHERE user_id = $1 AND coupon_id = $2",
    )
    .bind(user.id)
    .bind(coupon_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(held, 1);

    let received: i32 = sqlx::query_scalar("SELECT received_count FROM shop.coupon WHERE id = $1")
        .bind(coupon_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(received, 1);
}

// ============================================================================
// Subscriptions
// ============================================================================

#[tokio::test]
#[ignore = "Requires migrated database"]
async fn test_confirm_delivery_advances_and_awards_points() {
    let pool = database_pool().await;
    let user = create_customer(&pool).await;
    let milk = create_product(&pool, 100, true).await;
    let service = SubscriptionService::new(&pool);

    let subscription = service
        .create(
            user.id,
            &CreateSubscription {
                product_id: milk,
                frequency: SubscriptionFrequency::Weekly,
                quantity: 2,
                total_periods: 2,
                start_date: Local::now().date_naive(),
                address_id: None,
                receiver_name: Some("张三".to_owned()),
                receiver_phone: Some("13800138000".to_owned()),
                receiver_address: Some("上海市浦东新区世纪大道100号".to_owned()),
                remark: String::new(),
            },
        )
        .await
        .unwrap();
    let earned = SubscriptionPricing::delivery_points(subscription.period_price);
    assert!(earned > 0);

    let first = service
        .confirm_delivery(subscription.id, Some(user.id))
        .await
        .unwrap();
    assert_eq!(first.delivered_count, 1);
    assert_eq!(first.status, SubscriptionStatus::Active);
    assert_eq!(first.points_earned, earned);

    let last = service
        .confirm_delivery(subscription.id, Some(user.id))
        .await
        .unwrap();
    assert_eq!(last.delivered_count, 2);
    assert_eq!(last.status, SubscriptionStatus::Completed);

    let (delivered, points): (i32, i32) = sqlx::query_as(
        r"
        SELECT s.delivered_count, u.points
        FROM shop.subscription s JOIN shop.user u ON u.id = s.user_id
        WHERE s.id = $1
        ",
    )
    .bind(subscription.id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(delivered, 2);
    assert_eq!(points, earned * 2);

    let finished = service
        .confirm_delivery(subscription.id, Some(user.id))
        .await;
    assert!(finished.is_err_and(|e| is_bad_request(&e)));
}

// ============================================================================
// Membership
// ============================================================================

#[tokio::test]
#[ignore = "Requires migrated database"]
async fn test_two_purchases_from_one_session_both_count() {
    let pool = database_pool().await;
    let user = create_customer(&pool).await;
    let plan_id: i32 = sqlx::query_scalar(
        r"
        INSERT INTO shop.membership_plan (name, level, duration_days, original_price, price)
        VALUES ($1, 'gold', 30, 39.90, 29.90)
        RETURNING id
        ",
    )
    .bind(unique("黄金月卡"))
    .fetch_one(&pool)
    .await
    .expect("insert plan");
    let repo = MembershipRepository::new(&pool);
    let plan = repo.get_plan(MembershipPlanId::new(plan_id)).await.unwrap();

    let first = repo
        .create_order(&DocumentPrefix::Membership.generate(), user.id, &plan)
        .await
        .unwrap();
    let second = repo
        .create_order(&DocumentPrefix::Membership.generate(), user.id, &plan)
        .await
        .unwrap();

    // Both pays use the same `CurrentUser`, still showing a regular member.
    let before = Utc::now();
    let service = MembershipService::new(&pool);
    service.pay(&user, first.id).await.unwrap();
    let paid = service.pay(&user, second.id).await.unwrap();

    let expire_at = paid.expire_at.expect("gold expiry");
    assert!(expire_at >= before + Duration::days(60));
    assert!(expire_at <= Utc::now() + Duration::days(60));

    let (level, stored): (MemberLevel, Option<chrono::DateTime<Utc>>) =
        sqlx::query_as("SELECT member_level, member_expire_at FROM shop.user WHERE id = $1")
            .bind(user.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(level, MemberLevel::Gold);
    assert_eq!(stored, Some(expire_at));
}

// ============================================================================
// Capabilities
// ============================================================================

#[tokio::test]
#[ignore = "Requires migrated database"]
async fn test_customer_token_is_forbidden_on_admin_routes() {
    let pool = database_pool().await;
    let user = create_customer(&pool).await;
    let token = token_for(user.id.as_i32(), TokenType::Access);

    let response = app_with_pool(pool)
        .oneshot(
            Request::builder()
                .uri("/api/v1/admin/users")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
