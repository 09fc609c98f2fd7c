use async_trait::async_trait;
use cruise_shared::store::{BookingStore, PaymentStore};
use cruise_shared::{BookingStatus, Clock, Error, Payment, PaymentStatus, Result};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub mod provider {
    pub const WECHAT: &str = "wechat";
    pub const ALIPAY: &str = "alipay";
}

/// What a provider hands back when a payment order is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayOrder {
    pub trade_no: String,
    pub pay_url: String,
}

/// Opens payment orders with a provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn provider(&self) -> &'static str;

    async fn create_pay(&self, order_id: Uuid, amount: i64) -> Result<GatewayOrder>;
}

fn nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect()
}

/// Stand-in for the WeChat Pay v3 native API.
pub struct WechatGateway;

#[async_trait]
impl PaymentGateway for WechatGateway {
    fn provider(&self) -> &'static str {
        provider::WECHAT
    }

    async fn create_pay(&self, order_id: Uuid, _amount: i64) -> Result<GatewayOrder> {
        let trade_no = format!("wx_{}", order_id.simple());
        Ok(GatewayOrder {
            pay_url: format!("weixin://wxpay/bizpayurl?pr={trade_no}&nonce_str={}", nonce()),
            trade_no,
        })
    }
}

/// Stand-in for Alipay `alipay.trade.precreate`.
pub struct AlipayGateway;

#[async_trait]
impl PaymentGateway for AlipayGateway {
    fn provider(&self) -> &'static str {
        provider::ALIPAY
    }

    async fn create_pay(&self, order_id: Uuid, _amount: i64) -> Result<GatewayOrder> {
        let trade_no = format!("ali_{}", order_id.simple());
        Ok(GatewayOrder {
            pay_url: format!("alipays://platformapi/startapp?out_trade_no={trade_no}&nonce={}", nonce()),
            trade_no,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PaymentInitiation {
    pub payment: Payment,
    pub pay_url: String,
}

/// Opens a provider payment for a booking and records it as pending.
pub struct PaymentService {
    gateways: HashMap<&'static str, Arc<dyn PaymentGateway>>,
    payments: Arc<dyn PaymentStore>,
    bookings: Arc<dyn BookingStore>,
    clock: Arc<dyn Clock>,
}

impl PaymentService {
    pub fn new(payments: Arc<dyn PaymentStore>, bookings: Arc<dyn BookingStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            gateways: HashMap::new(),
            payments,
            bookings,
            clock,
        }
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateways.insert(gateway.provider(), gateway);
        self
    }

    /// Re-initiating an unpaid booking with the same provider returns the
    /// existing pending payment.
    pub async fn initiate(&self, booking_id: Uuid, provider: &str) -> Result<PaymentInitiation> {
        let gateway = self
            .gateways
            .get(provider)
            .ok_or_else(|| Error::UnknownProvider(provider.to_string()))?;

        let booking = self
            .bookings
            .get(booking_id)
            .await?
            .ok_or_else(|| Error::not_found("booking", booking_id))?;
        if booking.status != BookingStatus::Created {
            return Err(Error::Validation(format!(
                "booking {booking_id} is {}, only created bookings can be paid",
                booking.status
            )));
        }
        if booking.total_amount <= 0 {
            return Err(Error::InvalidAmount(booking.total_amount));
        }

        // One booking is paid through one provider only, or a second capture
        // would go unnoticed once the booking is already paid.
        let open = self.payments.for_order(booking_id).await?;
        if let Some(other) = open
            .iter()
            .find(|p| p.provider != provider && p.status != PaymentStatus::Failed)
        {
            warn!(%booking_id, provider, open_provider = %other.provider, payment_id = %other.id, "payment refused, booking already has a payment with another provider");
            return Err(Error::Validation(format!(
                "booking {booking_id} already has a {} payment with {}",
                other.status, other.provider
            )));
        }

        let order = gateway.create_pay(booking.id, booking.total_amount).await?;

        if let Some(existing) = self.payments.find_by_trade_no(provider, &order.trade_no).await? {
            if existing.status != PaymentStatus::Pending {
                return Err(Error::Validation(format!(
                    "payment {} for booking {booking_id} is already {}",
                    existing.id, existing.status
                )));
            }
            info!(payment_id = %existing.id, %booking_id, provider, "reusing pending payment");
            return Ok(PaymentInitiation {
                payment: existing,
                pay_url: order.pay_url,
            });
        }

        let payment = Payment::pending(booking.id, provider, order.trade_no, booking.total_amount, self.clock.now());
        self.payments.create(&payment).await?;
        info!(payment_id = %payment.id, %booking_id, provider, amount = payment.amount, "payment initiated");

        Ok(PaymentInitiation {
            payment,
            pay_url: order.pay_url,
        })
    }
}
