use crate::config::StripeConfig;
use crate::error::{AppError, AppResult};
use crate::external::payment_gateway::*;
use async_trait::async_trait;
use chrono::DateTime;
use std::collections::HashMap;
use stripe::{
    CancelSubscription, CheckoutSession, CheckoutSessionId, CheckoutSessionMode, Client,
    CreateCheckoutSession, CreateCheckoutSessionLineItems, CreateCheckoutSessionSubscriptionData,
    CreateCustomer, Customer, CustomerId, ListCustomers, Subscription, SubscriptionId,
};

#[derive(Clone)]
pub struct StripeGateway {
    client: Client,
}

impl StripeGateway {
    pub fn new(config: &StripeConfig) -> Self {
        Self {
            client: Client::new(config.secret_key.clone()),
        }
    }

    fn customer_from(customer: Customer) -> ProviderCustomer {
        ProviderCustomer {
            id: customer.id.to_string(),
            email: customer.email,
            metadata: customer.metadata.unwrap_or_default(),
        }
    }
}

fn parse_id<T: std::str::FromStr>(raw: &str, kind: &str) -> AppResult<T> {
    raw.parse::<T>()
        .map_err(|_| AppError::ValidationError(format!("Invalid {kind} id: {raw}")))
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> AppResult<ProviderSubscription> {
        let id: SubscriptionId = parse_id(subscription_id, "subscription")?;
        let subscription = Subscription::retrieve(&self.client, &id, &[]).await?;

        Ok(ProviderSubscription {
            id: subscription.id.to_string(),
            status: subscription.status.as_str().to_string(),
            customer_id: subscription.customer.id().to_string(),
            metadata: subscription.metadata.clone(),
            current_period_end: DateTime::from_timestamp(subscription.current_period_end, 0),
        })
    }

    async fn retrieve_customer(&self, customer_id: &str) -> AppResult<ProviderCustomer> {
        let id: CustomerId = parse_id(customer_id, "customer")?;
        let customer = Customer::retrieve(&self.client, &id, &[]).await?;
        Ok(Self::customer_from(customer))
    }

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> AppResult<ProviderCheckoutSession> {
        let id: CheckoutSessionId = parse_id(session_id, "checkout session")?;
        let session = CheckoutSession::retrieve(&self.client, &id, &[]).await?;

        Ok(ProviderCheckoutSession {
            id: session.id.to_string(),
            customer_id: session.customer.as_ref().map(|c| c.id().to_string()),
            subscription_id: session.subscription.as_ref().map(|s| s.id().to_string()),
        })
    }

    async fn find_or_create_customer(
        &self,
        user_id: i64,
        email: &str,
    ) -> AppResult<ProviderCustomer> {
        let uid = user_id.to_string();

        let mut list = ListCustomers::new();
        list.email = Some(email);
        let existing = Customer::list(&self.client, &list).await?;
        if let Some(customer) = existing.data.into_iter().find(|c| {
            c.metadata
                .as_ref()
                .and_then(|m| m.get(META_USER_ID))
                .is_some_and(|v| *v == uid)
        }) {
            return Ok(Self::customer_from(customer));
        }

        let mut params = CreateCustomer::new();
        params.email = Some(email);
        params.metadata = Some(HashMap::from([(META_USER_ID.to_string(), uid)]));
        let customer = Customer::create(&self.client, params).await?;
        log::info!("Created Stripe customer {} for user {user_id}", customer.id);
        Ok(Self::customer_from(customer))
    }

    async fn create_subscription_checkout(
        &self,
        checkout: SubscriptionCheckout,
    ) -> AppResult<CheckoutLink> {
        let customer: CustomerId = parse_id(&checkout.customer_id, "customer")?;

        let mut params = CreateCheckoutSession::new();
        params.success_url = Some(&checkout.success_url);
        params.cancel_url = Some(&checkout.cancel_url);
        params.customer = Some(customer);
        params.mode = Some(CheckoutSessionMode::Subscription);
        params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            price: Some(checkout.price_id.clone()),
            quantity: Some(1),
            ..Default::default()
        }]);
        params.subscription_data = Some(CreateCheckoutSessionSubscriptionData {
            metadata: Some(checkout.subscription_metadata.clone()),
            ..Default::default()
        });

        let session = CheckoutSession::create(&self.client, params).await?;
        let url = session.url.ok_or_else(|| {
            AppError::ExternalApiError("Checkout session has no redirect URL".to_string())
        })?;

        Ok(CheckoutLink {
            session_id: session.id.to_string(),
            url,
        })
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> AppResult<()> {
        let id: SubscriptionId = parse_id(subscription_id, "subscription")?;
        Subscription::cancel(&self.client, &id, CancelSubscription::new()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id_rejects_wrong_prefix() {
        assert!(parse_id::<SubscriptionId>("sub_123", "subscription").is_ok());
        let err = parse_id::<SubscriptionId>("cus_123", "subscription").unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }
}
