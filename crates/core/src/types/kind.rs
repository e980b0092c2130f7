//! Classification enums (types, reasons, sources) that are not lifecycles.

use crate::define_status;

define_status!(
    /// Audited user actions.
    UserAction, "shop.user_action" {
        Login => "login",
        Logout => "logout",
        Register => "register",
        Order => "order",
        Pay => "pay",
    }
);

define_status!(
    /// Direction of a points ledger entry.
    PointsType, "shop.points_type" {
        Earn => "earn",
        Spend => "spend",
        Expire => "expire",
        Adjust => "adjust",
    }
);

define_status!(
    /// What caused a points ledger entry.
    PointsSource, "shop.points_source" {
        Order => "order",
        Subscription => "subscription",
        Exchange => "exchange",
        Sign => "sign",
        Activity => "activity",
        Admin => "admin",
        Refund => "refund",
    }
);

define_status!(
    /// Payment channel.
    PaymentMethod, "shop.payment_method" {
        Alipay => "alipay",
        Wechat => "wechat",
        Sandbox => "sandbox",
    }
);

define_status!(
    /// Whether goods are sent back as part of a refund.
    RefundType, "shop.refund_type" {
        RefundOnly => "refund_only",
        ReturnRefund => "return_refund",
    }
);

define_status!(
    /// Customer-selected refund reason.
    RefundReason, "shop.refund_reason" {
        Quality => "quality",
        NotOnTime => "not_on_time",
        NotMatch => "not_match",
        NoNeed => "no_need",
        Other => "other",
    }
);

define_status!(
    /// How a coupon reduces the price.
    CouponType, "shop.coupon_type" {
        /// Percentage off, e.g. `9.5` means pay 95%.
        Discount => "discount",
        /// Fixed amount off.
        Amount => "amount",
        /// Free delivery.
        Shipping => "shipping",
    }
);

define_status!(
    /// Supported courier companies.
    ExpressCode, "shop.express_code" {
        Sf => "SF",
        Yto => "YTO",
        Zto => "ZTO",
        Yd => "YD",
        Jtsd => "JTSD",
    }
);

impl ExpressCode {
    /// Display name used when seeding companies and rendering waybills.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Sf => "顺丰速运",
            Self::Yto => "圆通速递",
            Self::Zto => "中通快递",
            Self::Yd => "韵达速递",
            Self::Jtsd => "极兔速递",
        }
    }
}

define_status!(
    /// Community feed tab. Wire values are the tab titles shown in the app.
    PostTab, "shop.post_tab" {
        Recommended => "推荐",
        Birthday => "生日礼",
        FreshDate => "新鲜日期",
        Showcase => "大家都在晒",
    }
);

define_status!(
    /// Where an advertisement is displayed.
    AdPosition, "shop.ad_position" {
        HomeBanner => "home_banner",
        HomePopup => "home_popup",
        CategoryBanner => "category_banner",
    }
);

define_status!(
    /// Notification message category.
    MessageType, "shop.message_type" {
        System => "system",
        Promotion => "promotion",
        Order => "order",
        NewProduct => "new_product",
        ExpiryWarning => "expiry_warning",
    }
);

define_status!(
    /// Feedback category.
    FeedbackType, "shop.feedback_type" {
        Suggestion => "suggestion",
        Complaint => "complaint",
        Quality => "quality",
        Delivery => "delivery",
        Other => "other",
    }
);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_post_tab_uses_display_titles() {
        assert_eq!(PostTab::Showcase.as_str(), "大家都在晒");
        assert_eq!("推荐".parse::<PostTab>().unwrap(), PostTab::Recommended);
        assert_eq!(
            serde_json::to_string(&PostTab::Birthday).unwrap(),
            "\"生日礼\""
        );
    }

    #[test]
    fn test_express_codes_are_upper_case() {
        assert_eq!(ExpressCode::Sf.as_str(), "SF");
        assert_eq!("JTSD".parse::<ExpressCode>().unwrap(), ExpressCode::Jtsd);
        assert!("sf".parse::<ExpressCode>().is_err());
    }

    #[test]
    fn test_refund_reason_parse() {
        assert_eq!(
            "not_on_time".parse::<RefundReason>().unwrap(),
            RefundReason::NotOnTime
        );
    }
}
