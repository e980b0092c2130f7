//! Reference and demo data.
//!
//! Every insert is keyed on a natural identifier (plan name, coupon code,
//! courier code, category/product/topic name), so running the command twice
//! leaves the database unchanged.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::info;

use freshmilk_core::{CouponStatus, CouponType, ExpressCode, MemberLevel};

use super::{CommandError, connect};

struct PlanSeed {
    name: &'static str,
    level: MemberLevel,
    duration_days: i32,
    /// Cents.
    original_price: i64,
    price: i64,
    description: &'static str,
    benefits: &'static [&'static str],
}

const PLANS: &[PlanSeed] = &[
    PlanSeed {
        name: "银卡月卡",
        level: MemberLevel::Silver,
        duration_days: 30,
        original_price: 2900,
        price: 1900,
        description: "银卡会员月度套餐，享受95折优惠",
        benefits: &["全场商品95折", "专属客服", "生日礼券"],
    },
    PlanSeed {
        name: "金卡季卡",
        level: MemberLevel::Gold,
        duration_days: 90,
        original_price: 9900,
        price: 6900,
        description: "金卡会员季度套餐，享受9折优惠",
        benefits: &["全场商品9折", "专属客服", "生日礼券", "积分1.5倍"],
    },
    PlanSeed {
        name: "铂金年卡",
        level: MemberLevel::Platinum,
        duration_days: 365,
        original_price: 29900,
        price: 19900,
        description: "铂金会员年度套餐，享受85折优惠",
        benefits: &["全场商品85折", "专属客服", "生日礼券", "积分2倍", "优先配送", "专属活动"],
    },
];

struct ExchangeCouponSeed {
    code: &'static str,
    amount: i64,
    min_amount: i64,
    points_required: i32,
}

const EXCHANGE_COUPONS: &[ExchangeCouponSeed] = &[
    ExchangeCouponSeed {
        code: "EXCHANGE5",
        amount: 5,
        min_amount: 30,
        points_required: 50,
    },
    ExchangeCouponSeed {
        code: "EXCHANGE10",
        amount: 10,
        min_amount: 50,
        points_required: 100,
    },
    ExchangeCouponSeed {
        code: "EXCHANGE20",
        amount: 20,
        min_amount: 100,
        points_required: 200,
    },
];

const CATEGORIES: &[(&str, &str, &str)] = &[
    ("纯牛奶", "🥛", "新鲜纯牛奶"),
    ("酸奶", "🥄", "浓郁酸奶"),
    ("低脂奶", "💧", "低脂健康牛奶"),
    ("A2牛奶", "🅰️", "A2型蛋白牛奶"),
    ("有机奶", "🌿", "有机牧场牛奶"),
    ("儿童奶", "👶", "儿童专属配方"),
];

struct ProductSeed {
    category: &'static str,
    name: &'static str,
    subtitle: &'static str,
    /// Cents.
    price: i64,
    original_price: i64,
    specification: &'static str,
    origin: &'static str,
    shelf_life: i32,
    stock: i32,
    is_hot: bool,
    is_new: bool,
    is_subscription: bool,
}

const PRODUCTS: &[ProductSeed] = &[
    ProductSeed {
        category: "纯牛奶",
        name: "悦鲜活鲜牛奶",
        subtitle: "0.09秒杀菌科技 锁住牛奶原生鲜醇",
        price: 28000,
        original_price: 51600,
        specification: "260ml*10瓶 共12期",
        origin: "山东优质牧场",
        shelf_life: 7,
        stock: 100,
        is_hot: true,
        is_new: false,
        is_subscription: true,
    },
    ProductSeed {
        category: "纯牛奶",
        name: "悦鲜活鲜活260",
        subtitle: "每日鲜送 新鲜直达",
        price: 72000,
        original_price: 106_800,
        specification: "260ml*10瓶",
        origin: "山东优质牧场",
        shelf_life: 7,
        stock: 50,
        is_hot: false,
        is_new: true,
        is_subscription: true,
    },
    ProductSeed {
        category: "A2牛奶",
        name: "亲和易吸收 认准A2型奶",
        subtitle: "周期购专享 自选发货时间 效期新鲜 自由退改",
        price: 28000,
        original_price: 36000,
        specification: "260ml*10瓶",
        origin: "澳洲优质牧场",
        shelf_life: 15,
        stock: 60,
        is_hot: true,
        is_new: false,
        is_subscription: true,
    },
    ProductSeed {
        category: "酸奶",
        name: "原味浓醇酸奶",
        subtitle: "传统工艺发酵 口感浓郁",
        price: 8800,
        original_price: 12000,
        specification: "200g*6杯",
        origin: "内蒙古牧场",
        shelf_life: 21,
        stock: 120,
        is_hot: false,
        is_new: true,
        is_subscription: false,
    },
    ProductSeed {
        category: "低脂奶",
        name: "低脂高钙牛奶",
        subtitle: "减脂不减营养 健康之选",
        price: 15800,
        original_price: 22000,
        specification: "250ml*12盒",
        origin: "新疆天山牧场",
        shelf_life: 180,
        stock: 200,
        is_hot: false,
        is_new: false,
        is_subscription: false,
    },
    ProductSeed {
        category: "有机奶",
        name: "有机纯牛奶",
        subtitle: "有机牧场认证 纯净奶源",
        price: 26800,
        original_price: 38000,
        specification: "250ml*12盒",
        origin: "呼伦贝尔有机牧场",
        shelf_life: 180,
        stock: 60,
        is_hot: true,
        is_new: false,
        is_subscription: false,
    },
    ProductSeed {
        category: "儿童奶",
        name: "儿童成长牛奶",
        subtitle: "添加DHA和钙 助力成长",
        price: 12800,
        original_price: 16800,
        specification: "200ml*12盒",
        origin: "黑龙江牧场",
        shelf_life: 180,
        stock: 150,
        is_hot: false,
        is_new: true,
        is_subscription: false,
    },
];

const TOPICS: &[(&str, &str)] = &[
    ("早餐搭配", "分享你的牛奶早餐"),
    ("宝宝成长", "和孩子一起喝奶的日常"),
    ("健身补给", "运动后的一杯奶"),
];

/// Errors from seeding.
#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error(transparent)]
    Connect(#[from] CommandError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Insert reference data, plus demo catalog data when `demo` is set.
///
/// # Errors
///
/// Returns an error if the database is unreachable or an insert fails.
pub async fn run(demo: bool) -> Result<(), SeedError> {
    let pool = connect().await?;

    let plans = seed_plans(&pool).await?;
    info!(plans, "Membership plans seeded");

    let coupons = seed_exchange_coupons(&pool).await?;
    info!(created = coupons, "Exchange coupons seeded");

    let couriers = seed_express_companies(&pool).await?;
    info!(created = couriers, "Express companies seeded");

    if demo {
        let (categories, products, topics) = seed_demo(&pool).await?;
        info!(categories, products, topics, "Demo data seeded");
    }

    info!("Seeding complete!");
    Ok(())
}

/// Plans are matched by name and overwritten, so price changes here reach
/// existing databases.
async fn seed_plans(pool: &PgPool) -> Result<usize, sqlx::Error> {
    for (sort_order, plan) in (1..).zip(PLANS) {
        let benefits = serde_json::json!(plan.benefits);
        let updated = sqlx::query(
            r"
            UPDATE shop.membership_plan
            SET level = $2, duration_days = $3, original_price = $4, price = $5,
                description = $6, benefits = $7, is_active = TRUE, sort_order = $8
            WHERE name = $1
            ",
        )
        .bind(plan.name)
        .bind(plan.level)
        .bind(plan.duration_days)
        .bind(Decimal::new(plan.original_price, 2))
        .bind(Decimal::new(plan.price, 2))
        .bind(plan.description)
        .bind(&benefits)
        .bind(sort_order)
        .execute(pool)
        .await?;

        if updated.rows_affected() == 0 {
            sqlx::query(
                r"
                INSERT INTO shop.membership_plan
                    (name, level, duration_days, original_price, price, description, benefits,
                     sort_order)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ",
            )
            .bind(plan.name)
            .bind(plan.level)
            .bind(plan.duration_days)
            .bind(Decimal::new(plan.original_price, 2))
            .bind(Decimal::new(plan.price, 2))
            .bind(plan.description)
            .bind(&benefits)
            .bind(sort_order)
            .execute(pool)
            .await?;
        }
    }
    Ok(PLANS.len())
}

/// Points-exchange coupons, valid for a year from the first seed.
async fn seed_exchange_coupons(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let now = Utc::now();
    let mut created = 0;
    for coupon in EXCHANGE_COUPONS {
        let result = sqlx::query(
            r"
            INSERT INTO shop.coupon
                (code, name, coupon_type, discount_amount, min_amount, start_time, end_time,
                 status, description, points_required, is_exchangeable)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, TRUE)
            ON CONFLICT (code) DO NOTHING
            ",
        )
        .bind(coupon.code)
        .bind(format!("{}元优惠券", coupon.amount))
        .bind(CouponType::Amount)
        .bind(Decimal::from(coupon.amount))
        .bind(Decimal::from(coupon.min_amount))
        .bind(now)
        .bind(now + Duration::days(365))
        .bind(CouponStatus::Active)
        .bind(format!("满{}元可用", coupon.min_amount))
        .bind(coupon.points_required)
        .execute(pool)
        .await?;
        created += result.rows_affected();
    }
    Ok(created)
}

/// One row per supported courier; SF becomes the default unless another
/// company already is.
async fn seed_express_companies(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let mut created = 0;
    for (sort_order, code) in (1..).zip(ExpressCode::ALL) {
        let result = sqlx::query(
            r"
            INSERT INTO shop.express_company (code, name, is_default, sort_order)
            SELECT $1, $2,
                   $3 AND NOT EXISTS (SELECT 1 FROM shop.express_company WHERE is_default),
                   $4
            ON CONFLICT (code) DO NOTHING
            ",
        )
        .bind(code)
        .bind(code.display_name())
        .bind(*code == ExpressCode::Sf)
        .bind(sort_order)
        .execute(pool)
        .await?;
        created += result.rows_affected();
    }
    Ok(created)
}

async fn seed_demo(pool: &PgPool) -> Result<(u64, u64, u64), sqlx::Error> {
    let mut categories = 0;
    for (sort_order, (name, icon, description)) in (1..).zip(CATEGORIES) {
        let result = sqlx::query(
            r"
            INSERT INTO shop.category (name, icon, description, sort_order)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (name) DO NOTHING
            ",
        )
        .bind(name)
        .bind(icon)
        .bind(description)
        .bind(sort_order)
        .execute(pool)
        .await?;
        categories += result.rows_affected();
    }

    let mut products = 0;
    for product in PRODUCTS {
        let result = sqlx::query(
            r"
            INSERT INTO shop.product
                (category_id, name, subtitle, price, original_price, specification, origin,
                 shelf_life, stock, is_hot, is_new, is_subscription)
            SELECT c.id, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12
            FROM shop.category c WHERE c.name = $1
            ON CONFLICT (name) DO NOTHING
            ",
        )
        .bind(product.category)
        .bind(product.name)
        .bind(product.subtitle)
        .bind(Decimal::new(product.price, 2))
        .bind(Decimal::new(product.original_price, 2))
        .bind(product.specification)
        .bind(product.origin)
        .bind(product.shelf_life)
        .bind(product.stock)
        .bind(product.is_hot)
        .bind(product.is_new)
        .bind(product.is_subscription)
        .execute(pool)
        .await?;
        products += result.rows_affected();
    }

    let mut topics = 0;
    for (sort_order, (name, description)) in (1..).zip(TOPICS) {
        let result = sqlx::query(
            r"
            INSERT INTO shop.topic (name, description, sort_order)
            VALUES ($1, $2, $3)
            ON CONFLICT (name) DO NOTHING
            ",
        )
        .bind(name)
        .bind(description)
        .bind(sort_order)
        .execute(pool)
        .await?;
        topics += result.rows_affected();
    }

    Ok((categories, products, topics))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_prices_match_tiers() {
        let prices: Vec<Decimal> = PLANS.iter().map(|p| Decimal::new(p.price, 2)).collect();
        assert_eq!(
            prices,
            vec![Decimal::new(1900, 2), Decimal::new(6900, 2), Decimal::new(19900, 2)]
        );
        assert!(PLANS.iter().all(|p| p.original_price > p.price));
    }

    #[test]
    fn test_exchange_coupons_cost_ten_points_per_yuan() {
        for coupon in EXCHANGE_COUPONS {
            assert_eq!(i64::from(coupon.points_required), coupon.amount * 10);
            assert!(coupon.min_amount > coupon.amount);
        }
    }

    #[test]
    fn test_demo_products_reference_known_categories() {
        for product in PRODUCTS {
            assert!(
                CATEGORIES.iter().any(|(name, _, _)| *name == product.category),
                "{} has unknown category {}",
                product.name,
                product.category
            );
        }
    }
}
