//! Shipping orders through courier companies.
//!
//! Glue between the order table, the stored shipments and traces, and the
//! courier adapters in [`super::express`].

use chrono::Utc;
use sqlx::PgPool;
use tracing::instrument;

use freshmilk_core::{ExpressCode, ExpressOrderId, ExpressStatus, OrderId, OrderStatus};

use crate::config::SenderConfig;
use crate::db::RepositoryError;
use crate::db::express::{self, ExpressRepository, NewExpressOrder, NewTrace};
use crate::db::orders::{self, OrderRepository};
use crate::error::{AppError, Result};
use crate::models::express::{ExpressCompany, ExpressOrder, ExpressOrderDetail};
use crate::models::order::Order;
use crate::models::user::CurrentUser;

use super::express::{
    CreateRequest, ExpressProvider, Goods, Party, PickupBooking, PickupDay, PickupRequest,
    TraceEvent, Waybill, placeholder_express_no, provider_for,
};
use super::not_found;

/// Courier workflows for orders.
pub struct ShippingService<'a> {
    pool: &'a PgPool,
    http: &'a reqwest::Client,
    sender: &'a SenderConfig,
    demo_mode: bool,
    express: ExpressRepository<'a>,
    orders: OrderRepository<'a>,
}

impl<'a> ShippingService<'a> {
    /// Create a new shipping service.
    #[must_use]
    pub const fn new(
        pool: &'a PgPool,
        http: &'a reqwest::Client,
        sender: &'a SenderConfig,
        demo_mode: bool,
    ) -> Self {
        Self {
            pool,
            http,
            sender,
            demo_mode,
            express: ExpressRepository::new(pool),
            orders: OrderRepository::new(pool),
        }
    }

    /// Hand a paid order to a courier and mark it shipped.
    ///
    /// Uses the company with `company_code`, or the default company. When
    /// the carrier call fails the shipment gets a placeholder number so the
    /// order can still leave the warehouse.
    ///
    /// # Errors
    ///
    /// Returns 400 when the order is not paid, the company is unavailable,
    /// or no sender is configured.
    #[instrument(skip(self, remark))]
    pub async fn ship(
        &self,
        order_id: OrderId,
        company_code: Option<ExpressCode>,
        remark: &str,
    ) -> Result<ExpressOrderDetail> {
        let order = self
            .orders
            .get(order_id)
            .await
            .map_err(not_found("订单不存在"))?;
        if order.status != OrderStatus::Paid {
            return Err(AppError::bad_request("只有已支付的订单可以发货"));
        }

        let company = self
            .express
            .find_active_company(company_code)
            .await?
            .ok_or_else(|| AppError::bad_request("快递公司不存在或未启用"))?;
        let sender = Party::sender(Some(&company), self.sender);
        if sender.name.trim().is_empty()
            || sender.phone.trim().is_empty()
            || sender.address.trim().is_empty()
        {
            return Err(AppError::bad_request("请先配置发件人信息"));
        }

        let goods: Vec<Goods> = self
            .orders
            .items(order.id)
            .await?
            .into_iter()
            .map(|item| Goods {
                name: item.product_name,
                quantity: item.quantity,
            })
            .collect();
        let receiver = receiver_of(&order);

        let provider = self.provider(Some(&company));
        let express_no = match provider
            .create_order(&CreateRequest {
                order_no: &order.order_no,
                sender: &sender,
                receiver: &receiver,
                goods: &goods,
                remark,
            })
            .await
        {
            Ok(created) => created.express_no,
            Err(e) => {
                let fallback = placeholder_express_no(company.code, Utc::now());
                tracing::warn!(
                    error = %e,
                    order_no = %order.order_no,
                    express_no = %fallback,
                    "courier order failed, using placeholder number"
                );
                fallback
            }
        };

        let mut tx = self.pool.begin().await?;
        let id = express::insert_order(
            &mut tx,
            &NewExpressOrder {
                order_id: order.id,
                company_id: company.id,
                express_no: &express_no,
                receiver_name: &order.receiver_name,
                receiver_phone: &order.receiver_phone,
                receiver_address: &order.receiver_address,
                remark: remark.trim(),
            },
        )
        .await?;
        orders::transition(&mut tx, order.id, OrderStatus::Paid, OrderStatus::Shipped)
            .await?
            .ok_or_else(|| AppError::bad_request("只有已支付的订单可以发货"))?;
        orders::set_shipping(&mut tx, order.id, &company.name, &express_no).await?;
        tx.commit().await?;

        tracing::info!(order_no = %order.order_no, %express_no, company = %company.code, "order shipped");
        Ok(ExpressOrderDetail {
            express_order: self.express.get_order(id, None).await?,
            traces: Vec::new(),
        })
    }

    /// A user's shipment with its traces. When nothing is stored yet the
    /// carrier is queried once and the result persisted.
    ///
    /// # Errors
    ///
    /// Returns 404 for someone else's shipment.
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn trace(
        &self,
        user: &CurrentUser,
        id: ExpressOrderId,
    ) -> Result<ExpressOrderDetail> {
        let owner = (!user.is_admin).then_some(user.id);
        let shipment = self
            .express
            .get_order(id, owner)
            .await
            .map_err(not_found("物流信息不存在"))?;

        let traces = self.express.traces(shipment.id).await?;
        if !traces.is_empty() {
            return Ok(ExpressOrderDetail {
                express_order: shipment,
                traces,
            });
        }

        match self.refresh_shipment(shipment).await {
            Ok(detail) => Ok(detail),
            Err(AppError::Express(e)) => {
                tracing::warn!(error = %e, "trace query failed");
                let shipment = self.express.get_order(id, owner).await?;
                Ok(ExpressOrderDetail {
                    express_order: shipment,
                    traces: Vec::new(),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Re-query the carrier for an order's shipment, store new traces, and
    /// update its status.
    ///
    /// # Errors
    ///
    /// Returns 404 when the order has no shipment and 502 when the carrier
    /// cannot be reached.
    #[instrument(skip(self))]
    pub async fn refresh(&self, order_id: OrderId) -> Result<ExpressOrderDetail> {
        let shipment = self.latest(order_id).await?;
        self.refresh_shipment(shipment).await
    }

    /// Shipment of an order looked up by id or order number.
    ///
    /// # Errors
    ///
    /// Returns 404 for an unknown order or one without a shipment, and 403
    /// when the order belongs to someone else.
    pub async fn by_order(&self, user: &CurrentUser, key: &str) -> Result<ExpressOrderDetail> {
        let key = key.trim();
        let order = match key.parse::<i32>() {
            Ok(id) => self.orders.get(OrderId::new(id)).await,
            Err(_) => self.orders.get_by_no(key).await,
        }
        .map_err(not_found("订单不存在"))?;
        if order.user_id != user.id && !user.is_admin {
            return Err(AppError::forbidden("无权查看该订单的物流信息"));
        }

        let shipment = self.latest(order.id).await?;
        let traces = self.express.traces(shipment.id).await?;
        Ok(ExpressOrderDetail {
            express_order: shipment,
            traces,
        })
    }

    /// Waybill image for an order's shipment.
    ///
    /// # Errors
    ///
    /// Returns 404 when the order has no shipment and 400 when the carrier
    /// cannot render one.
    pub async fn waybill(&self, order_id: OrderId) -> Result<Waybill> {
        let shipment = self.latest(order_id).await?;
        let provider = self.provider_of(&shipment).await?;
        Ok(provider
            .waybill(&shipment.express_no, &shipment.order_no)
            .await?)
    }

    /// Book a courier pickup for an order's shipment.
    ///
    /// # Errors
    ///
    /// Returns 400 for a blank time or a shipment that is no longer
    /// waiting for collection.
    #[instrument(skip(self, remark))]
    pub async fn book_pickup(
        &self,
        order_id: OrderId,
        pickup_time: &str,
        remark: &str,
    ) -> Result<PickupBooking> {
        let pickup_time = pickup_time.trim();
        if pickup_time.is_empty() {
            return Err(AppError::bad_request("请选择取件时间"));
        }
        let shipment = self.latest(order_id).await?;
        if shipment.status != ExpressStatus::Created {
            return Err(AppError::bad_request("快递已揽收或已取消，无法预约取件"));
        }

        let company = self.company_of(&shipment).await?;
        let contact = Party::sender(company.as_ref(), self.sender);
        let booking = self
            .provider(company.as_ref())
            .book_pickup(
                &shipment.express_no,
                &PickupRequest {
                    pickup_time,
                    contact: &contact,
                    remark,
                },
            )
            .await?;
        self.express
            .set_pickup(shipment.id, Some(pickup_time), &booking.pickup_code)
            .await?;
        Ok(booking)
    }

    /// Cancel a booked pickup.
    ///
    /// # Errors
    ///
    /// Returns 400 when no pickup is booked.
    #[instrument(skip(self))]
    pub async fn cancel_pickup(&self, order_id: OrderId) -> Result<()> {
        let shipment = self.latest(order_id).await?;
        if shipment.pickup_code.is_empty() {
            return Err(AppError::bad_request("该快递没有预约取件"));
        }
        let provider = self.provider_of(&shipment).await?;
        provider.cancel_pickup(&shipment.express_no).await?;
        self.express.set_pickup(shipment.id, None, "").await?;
        Ok(())
    }

    /// Bookable pickup windows for a company, or the default company.
    ///
    /// # Errors
    ///
    /// Returns 400 when the company is unavailable.
    pub async fn pickup_times(&self, company_code: Option<ExpressCode>) -> Result<Vec<PickupDay>> {
        let company = self
            .express
            .find_active_company(company_code)
            .await?
            .ok_or_else(|| AppError::bad_request("快递公司不存在或未启用"))?;
        let address = Party::sender(Some(&company), self.sender).full_address();
        Ok(self.provider(Some(&company)).pickup_times(&address).await?)
    }

    /// Cancel an order's shipment and put the order back to paid.
    ///
    /// # Errors
    ///
    /// Returns 400 once the parcel is signed for, the order is completed,
    /// or the shipment is already cancelled.
    #[instrument(skip(self))]
    pub async fn cancel(&self, order_id: OrderId) -> Result<ExpressOrder> {
        let order = self
            .orders
            .get(order_id)
            .await
            .map_err(not_found("订单不存在"))?;
        let shipment = self.latest(order_id).await?;
        if shipment.status == ExpressStatus::Signed || order.status == OrderStatus::Completed {
            return Err(AppError::bad_request("快递已签收或订单已完成，无法取消"));
        }
        if !shipment.status.is_cancellable() {
            return Err(AppError::bad_request("快递已取消"));
        }

        let provider = self.provider_of(&shipment).await?;
        if let Err(e) = provider.cancel_order(&shipment.express_no).await {
            tracing::warn!(error = %e, express_no = %shipment.express_no, "courier cancel failed");
        }

        let mut tx = self.pool.begin().await?;
        express::cancel_order(&mut tx, shipment.id).await?;
        express::unship_order(&mut tx, order_id).await?;
        tx.commit().await?;

        tracing::info!(order_no = %order.order_no, express_no = %shipment.express_no, "shipment cancelled");
        Ok(self.express.get_order(shipment.id, None).await?)
    }

    async fn refresh_shipment(&self, shipment: ExpressOrder) -> Result<ExpressOrderDetail> {
        let provider = self.provider_of(&shipment).await?;
        let tracking = provider.query_trace(&shipment.express_no).await?;

        let new: Vec<NewTrace> = tracking.traces.into_iter().map(to_new_trace).collect();
        let added = self.express.add_traces(shipment.id, &new).await?;
        if tracking.status != shipment.status {
            self.express.set_status(&shipment, tracking.status).await?;
        }
        tracing::debug!(express_no = %shipment.express_no, added, status = %tracking.status, "trace refreshed");

        Ok(ExpressOrderDetail {
            traces: self.express.traces(shipment.id).await?,
            express_order: self.express.get_order(shipment.id, None).await?,
        })
    }

    async fn latest(&self, order_id: OrderId) -> Result<ExpressOrder> {
        self.express
            .latest_for_order(order_id)
            .await?
            .ok_or_else(|| AppError::not_found("该订单没有物流信息"))
    }

    async fn company_of(&self, shipment: &ExpressOrder) -> Result<Option<ExpressCompany>> {
        match shipment.company_id {
            Some(id) => match self.express.get_company(id).await {
                Ok(company) => Ok(Some(company)),
                Err(RepositoryError::NotFound) => Ok(None),
                Err(e) => Err(e.into()),
            },
            None => Ok(None),
        }
    }

    async fn provider_of(&self, shipment: &ExpressOrder) -> Result<Box<dyn ExpressProvider>> {
        let company = self.company_of(shipment).await?;
        Ok(self.provider(company.as_ref()))
    }

    fn provider(&self, company: Option<&ExpressCompany>) -> Box<dyn ExpressProvider> {
        provider_for(company, ExpressCode::Sf, self.demo_mode, self.http)
    }
}

/// Receiver party of an order. The address is stored on one line.
fn receiver_of(order: &Order) -> Party {
    Party {
        name: order.receiver_name.clone(),
        phone: order.receiver_phone.clone(),
        address: order.receiver_address.clone(),
        ..Party::default()
    }
}

fn to_new_trace(event: TraceEvent) -> NewTrace {
    NewTrace {
        time: event.time,
        status: event.status,
        description: event.description,
        location: event.location,
    }
}
