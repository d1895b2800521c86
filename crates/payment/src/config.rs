/// Payment service settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentConfig {
    /// Hand out links to the mock gateway instead of a real one.
    pub mock_gateway: bool,
    /// Base URL of the mock gateway's pay page.
    pub mock_gateway_url: String,
}

impl PaymentConfig {
    /// Returns the link the payer follows for `payment_no`, if any.
    pub fn pay_url(&self, payment_no: &str) -> Option<String> {
        self.mock_gateway
            .then(|| format!("{}?payment_no={payment_no}", self.mock_gateway_url))
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            mock_gateway: true,
            mock_gateway_url: "http://mock-payment.com/pay".to_string(),
        }
    }
}
