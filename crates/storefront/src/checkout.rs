//! Three-step checkout flow: delivery address, payment, confirmation.
//!
//! [`CheckoutFlow`] is a pure state machine over a snapshot of the cart
//! taken at [`CheckoutFlow::begin`]; it owns its forms, the selected
//! shipping option, and the running quote, and talks to the backend only
//! at [`CheckoutFlow::submit`]. Step gates validate on advance, never on
//! keystroke, and a failed gate records a message without moving the step.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use solera_core::{CurrencyCode, Email, OrderId, Price, UserId};

use crate::backend::{BackendError, OrdersApi};
use crate::shipping::{ShippingCalculation, ShippingCalculator};
use crate::types::{Address, CartLine, OrderDraft, PaymentMethod, Profile};

/// Errors raised by the checkout flow.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Checkout cannot begin over an empty cart.
    #[error("cart is empty")]
    EmptyCart,

    /// A form gate failed; the message names the offending fields.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The selected district does not belong to the selected city.
    #[error("district does not belong to the selected city")]
    DistrictNotInCity,

    /// Submission was attempted without accepting the terms.
    #[error("terms must be accepted before placing the order")]
    TermsNotAccepted,

    /// Submission was attempted before reaching the confirmation step.
    #[error("order can only be placed from the confirmation step")]
    NotAtConfirmation,

    /// The order write failed; the flow stays at confirmation for retry.
    #[error("order submission failed: {0}")]
    Backend(#[from] BackendError),
}

/// The steps of the flow, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CheckoutStep {
    Delivery,
    Payment,
    Confirmation,
}

/// A city and the districts addresses in it may use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct City {
    pub name: String,
    pub districts: Vec<String>,
}

/// Lookup table of known cities.
///
/// Cities absent from the directory accept free-text districts; for known
/// cities the district must be one of the listed entries.
#[derive(Debug, Clone, Default)]
pub struct CityDirectory {
    cities: HashMap<String, Vec<String>>,
}

impl CityDirectory {
    #[must_use]
    pub fn new(cities: Vec<City>) -> Self {
        Self {
            cities: cities.into_iter().map(|c| (c.name, c.districts)).collect(),
        }
    }

    /// Districts of a known city, `None` for an unknown one.
    #[must_use]
    pub fn districts_of(&self, city: &str) -> Option<&[String]> {
        self.cities.get(city).map(Vec::as_slice)
    }

    /// True when the city is known and lists the district.
    #[must_use]
    pub fn is_valid_district(&self, city: &str, district: &str) -> bool {
        self.districts_of(city)
            .is_some_and(|districts| districts.iter().any(|d| d == district))
    }
}

/// Which address a form edit targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    Delivery,
    Billing,
}

/// Raw address form state, edited field by field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressForm {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub line1: String,
    pub city: String,
    pub district: String,
    pub postal_code: String,
}

impl AddressForm {
    fn prefill(profile: &Profile) -> Self {
        Self {
            full_name: profile.display_name.clone().unwrap_or_default(),
            email: profile.email.as_str().to_string(),
            phone: profile.phone.clone().unwrap_or_default(),
            ..Self::default()
        }
    }

    /// Names of required fields that are still blank.
    ///
    /// District is required once a city is chosen; postal code is optional.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        let required = [
            ("full name", &self.full_name),
            ("email", &self.email),
            ("phone", &self.phone),
            ("address line", &self.line1),
            ("city", &self.city),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                missing.push(name);
            }
        }
        if !self.city.trim().is_empty() && self.district.trim().is_empty() {
            missing.push("district");
        }
        missing
    }

    /// Validate into a submittable [`Address`].
    ///
    /// # Errors
    ///
    /// [`CheckoutError::Validation`] naming the blank fields, or the email
    /// parse failure. The step gates only check for blanks, so a malformed
    /// email passes the gate and is caught here at submission.
    pub fn validate(&self) -> Result<Address, CheckoutError> {
        let missing = self.missing_fields();
        if !missing.is_empty() {
            return Err(CheckoutError::Validation(missing.join(", ")));
        }
        let email = Email::parse(&self.email)
            .map_err(|e| CheckoutError::Validation(format!("email: {e}")))?;
        let postal_code = match self.postal_code.trim() {
            "" => None,
            code => Some(code.to_string()),
        };
        Ok(Address {
            full_name: self.full_name.trim().to_string(),
            email,
            phone: self.phone.trim().to_string(),
            line1: self.line1.trim().to_string(),
            city: self.city.trim().to_string(),
            district: self.district.trim().to_string(),
            postal_code,
        })
    }
}

/// One checkout attempt over a cart snapshot.
pub struct CheckoutFlow {
    lines: Vec<CartLine>,
    subtotal: Price,
    directory: CityDirectory,
    calculator: Arc<dyn ShippingCalculator>,
    step: CheckoutStep,
    delivery: AddressForm,
    billing: AddressForm,
    same_as_delivery: bool,
    selected_option: String,
    quote: ShippingCalculation,
    payment_method: PaymentMethod,
    terms_accepted: bool,
    validation_error: Option<String>,
}

impl CheckoutFlow {
    /// Start a checkout over the given cart lines.
    ///
    /// Prefills the delivery form from the profile when one is available
    /// (synthesized profiles prefill too; their fields are simply sparser)
    /// and quotes shipping with the first available option selected.
    ///
    /// # Errors
    ///
    /// [`CheckoutError::EmptyCart`] when there is nothing to buy.
    pub fn begin(
        lines: Vec<CartLine>,
        profile: Option<&Profile>,
        directory: CityDirectory,
        calculator: Arc<dyn ShippingCalculator>,
        currency: CurrencyCode,
    ) -> Result<Self, CheckoutError> {
        if lines.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        let subtotal = lines
            .iter()
            .fold(Price::zero(currency), |acc, l| acc.add(l.line_total()));

        let quote = calculator.calculate(subtotal, "");
        let selected_option = quote
            .available_options
            .first()
            .map(|o| o.id.clone())
            .unwrap_or_default();

        let delivery = profile.map_or_else(AddressForm::default, AddressForm::prefill);

        Ok(Self {
            lines,
            subtotal,
            directory,
            calculator,
            step: CheckoutStep::Delivery,
            delivery,
            billing: AddressForm::default(),
            same_as_delivery: true,
            selected_option,
            quote,
            payment_method: PaymentMethod::default(),
            terms_accepted: false,
            validation_error: None,
        })
    }

    #[must_use]
    pub fn step(&self) -> CheckoutStep {
        self.step
    }

    #[must_use]
    pub fn form(&self, kind: AddressKind) -> &AddressForm {
        match kind {
            AddressKind::Delivery => &self.delivery,
            AddressKind::Billing => &self.billing,
        }
    }

    pub fn form_mut(&mut self, kind: AddressKind) -> &mut AddressForm {
        match kind {
            AddressKind::Delivery => &mut self.delivery,
            AddressKind::Billing => &mut self.billing,
        }
    }

    /// Select a city, clearing the district unless the new city also lists
    /// the currently selected district name.
    pub fn select_city(&mut self, kind: AddressKind, city: &str) {
        let district = self.form(kind).district.clone();
        let keep = !district.is_empty() && self.directory.is_valid_district(city, &district);
        let form = self.form_mut(kind);
        form.city = city.to_string();
        if !keep {
            form.district.clear();
        }
    }

    /// Select a district for the currently selected city.
    ///
    /// # Errors
    ///
    /// [`CheckoutError::DistrictNotInCity`] when the city is known to the
    /// directory and does not list the district.
    pub fn select_district(&mut self, kind: AddressKind, district: &str) -> Result<(), CheckoutError> {
        let city = self.form(kind).city.clone();
        if self.directory.districts_of(&city).is_some()
            && !self.directory.is_valid_district(&city, district)
        {
            return Err(CheckoutError::DistrictNotInCity);
        }
        self.form_mut(kind).district = district.to_string();
        Ok(())
    }

    /// Toggle billing-same-as-delivery. Turning it back on leaves the
    /// billing form's contents intact but ignored.
    pub fn set_same_as_delivery(&mut self, same: bool) {
        self.same_as_delivery = same;
    }

    /// Select a shipping option and requote.
    pub fn select_shipping_option(&mut self, option_id: &str) {
        self.selected_option = option_id.to_string();
        self.quote = self.calculator.calculate(self.subtotal, &self.selected_option);
    }

    pub fn set_payment_method(&mut self, method: PaymentMethod) {
        self.payment_method = method;
    }

    pub fn set_terms_accepted(&mut self, accepted: bool) {
        self.terms_accepted = accepted;
    }

    /// The currently displayed gate or submission error, if any.
    #[must_use]
    pub fn validation_error(&self) -> Option<&str> {
        self.validation_error.as_deref()
    }

    #[must_use]
    pub fn quote(&self) -> &ShippingCalculation {
        &self.quote
    }

    #[must_use]
    pub fn subtotal(&self) -> Price {
        self.subtotal
    }

    #[must_use]
    pub fn free_shipping_remaining(&self) -> Price {
        self.calculator.free_shipping_remaining(self.subtotal)
    }

    /// Advance to the next step, running the current step's gate.
    ///
    /// The delivery gate checks required fields for blanks and the district
    /// against the directory; full validation (email shape) runs at submit.
    ///
    /// # Errors
    ///
    /// The gate error; the step does not move and the message is kept for
    /// display via [`Self::validation_error`].
    pub fn advance(&mut self) -> Result<CheckoutStep, CheckoutError> {
        let gated = match self.step {
            CheckoutStep::Delivery => self.gate_addresses().map(|()| CheckoutStep::Payment),
            CheckoutStep::Payment | CheckoutStep::Confirmation => Ok(CheckoutStep::Confirmation),
        };
        match gated {
            Ok(next) => {
                self.step = next;
                self.validation_error = None;
                Ok(next)
            }
            Err(e) => {
                self.validation_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Step back toward delivery. Never fails; gates only guard forward
    /// motion.
    pub fn back(&mut self) {
        self.step = match self.step {
            CheckoutStep::Delivery | CheckoutStep::Payment => CheckoutStep::Delivery,
            CheckoutStep::Confirmation => CheckoutStep::Payment,
        };
        self.validation_error = None;
    }

    fn gate_addresses(&self) -> Result<(), CheckoutError> {
        Self::gate_form(&self.directory, &self.delivery)?;
        if !self.same_as_delivery {
            Self::gate_form(&self.directory, &self.billing)?;
        }
        Ok(())
    }

    fn gate_form(directory: &CityDirectory, form: &AddressForm) -> Result<(), CheckoutError> {
        let missing = form.missing_fields();
        if !missing.is_empty() {
            return Err(CheckoutError::Validation(missing.join(", ")));
        }
        if directory.districts_of(&form.city).is_some()
            && !directory.is_valid_district(&form.city, &form.district)
        {
            return Err(CheckoutError::DistrictNotInCity);
        }
        Ok(())
    }

    /// Place the order.
    ///
    /// Requires the confirmation step and accepted terms; validates both
    /// addresses fully and requotes shipping against the final selection
    /// before building the order payload. On failure the flow stays at
    /// confirmation so the user can correct and retry.
    ///
    /// # Errors
    ///
    /// [`CheckoutError::NotAtConfirmation`], [`CheckoutError::TermsNotAccepted`],
    /// a validation error, or the backend submission error.
    #[instrument(skip(self, orders))]
    pub async fn submit(
        &mut self,
        orders: &dyn OrdersApi,
        user: UserId,
    ) -> Result<OrderId, CheckoutError> {
        if self.step != CheckoutStep::Confirmation {
            return Err(CheckoutError::NotAtConfirmation);
        }
        if !self.terms_accepted {
            let e = CheckoutError::TermsNotAccepted;
            self.validation_error = Some(e.to_string());
            return Err(e);
        }

        let delivery = match self.delivery.validate() {
            Ok(address) => address,
            Err(e) => {
                self.validation_error = Some(e.to_string());
                return Err(e);
            }
        };
        let billing = if self.same_as_delivery {
            delivery.clone()
        } else {
            match self.billing.validate() {
                Ok(address) => address,
                Err(e) => {
                    self.validation_error = Some(e.to_string());
                    return Err(e);
                }
            }
        };

        self.quote = self.calculator.calculate(self.subtotal, &self.selected_option);
        let draft = OrderDraft {
            user_id: user,
            lines: self.lines.clone(),
            delivery,
            billing,
            shipping_option_id: self.selected_option.clone(),
            subtotal: self.subtotal,
            shipping_cost: self.quote.shipping_cost,
            total: self.quote.total,
            payment_method: self.payment_method,
        };

        let order_id = orders.submit_order(&draft).await?;
        self.validation_error = None;
        Ok(order_id)
    }
}

#[cfg(test)]
mod tests {
    use solera_core::ProductId;

    use crate::backend::mock::{MockBackend, server_line};
    use crate::shipping::test_support::{lira, standard_table};

    use super::*;

    fn directory() -> CityDirectory {
        CityDirectory::new(vec![
            City {
                name: "Istanbul".into(),
                districts: vec!["Kadikoy".into(), "Besiktas".into(), "Merkez".into()],
            },
            City {
                name: "Izmir".into(),
                districts: vec!["Konak".into(), "Bornova".into(), "Merkez".into()],
            },
        ])
    }

    fn cart_of_450() -> Vec<CartLine> {
        vec![server_line(ProductId::generate(), None, 3, lira(150, 0))]
    }

    fn flow(lines: Vec<CartLine>) -> CheckoutFlow {
        CheckoutFlow::begin(
            lines,
            None,
            directory(),
            Arc::new(standard_table()),
            CurrencyCode::TRY,
        )
        .unwrap()
    }

    fn fill_delivery(flow: &mut CheckoutFlow) {
        let form = flow.form_mut(AddressKind::Delivery);
        form.full_name = "Ada Yilmaz".into();
        form.email = "ada@example.com".into();
        form.phone = "+90 555 000 00 00".into();
        form.line1 = "Moda Cad. 1".into();
        flow.select_city(AddressKind::Delivery, "Istanbul");
        flow.select_district(AddressKind::Delivery, "Kadikoy").unwrap();
    }

    #[test]
    fn begin_rejects_an_empty_cart() {
        let result = CheckoutFlow::begin(
            vec![],
            None,
            directory(),
            Arc::new(standard_table()),
            CurrencyCode::TRY,
        );
        assert!(matches!(result, Err(CheckoutError::EmptyCart)));
    }

    #[test]
    fn begin_quotes_with_the_first_available_option() {
        let flow = flow(cart_of_450());

        assert_eq!(flow.subtotal(), lira(450, 0));
        assert_eq!(flow.quote().shipping_cost, lira(29, 90));
        assert_eq!(flow.quote().total, lira(479, 90));
        assert_eq!(flow.free_shipping_remaining(), lira(50, 0));
    }

    #[test]
    fn begin_prefills_from_the_profile() {
        use solera_core::{Role, UserId};
        use crate::types::ProfileSource;

        let profile = Profile {
            id: UserId::generate(),
            email: Email::parse("ada@example.com").unwrap(),
            display_name: Some("Ada Yilmaz".into()),
            phone: Some("+90 555 000 00 00".into()),
            role: Role::Customer,
            source: ProfileSource::Remote,
        };

        let flow = CheckoutFlow::begin(
            cart_of_450(),
            Some(&profile),
            directory(),
            Arc::new(standard_table()),
            CurrencyCode::TRY,
        )
        .unwrap();

        let form = flow.form(AddressKind::Delivery);
        assert_eq!(form.full_name, "Ada Yilmaz");
        assert_eq!(form.email, "ada@example.com");
        assert_eq!(form.phone, "+90 555 000 00 00");
    }

    #[test]
    fn delivery_gate_names_blank_fields_and_does_not_move() {
        let mut flow = flow(cart_of_450());
        flow.form_mut(AddressKind::Delivery).full_name = "Ada".into();

        let result = flow.advance();

        assert!(matches!(result, Err(CheckoutError::Validation(_))));
        assert_eq!(flow.step(), CheckoutStep::Delivery);
        let message = flow.validation_error().unwrap();
        assert!(message.contains("email"));
        assert!(message.contains("city"));
        assert!(!message.contains("full name"));
    }

    #[test]
    fn delivery_gate_checks_presence_not_email_shape() {
        let mut flow = flow(cart_of_450());
        fill_delivery(&mut flow);
        flow.form_mut(AddressKind::Delivery).email = "not-an-email".into();

        // blank-only gate lets it through; submit catches the malformed email
        assert_eq!(flow.advance().unwrap(), CheckoutStep::Payment);
    }

    #[test]
    fn changing_city_clears_a_foreign_district() {
        let mut flow = flow(cart_of_450());
        flow.select_city(AddressKind::Delivery, "Istanbul");
        flow.select_district(AddressKind::Delivery, "Kadikoy").unwrap();

        flow.select_city(AddressKind::Delivery, "Izmir");

        assert_eq!(flow.form(AddressKind::Delivery).district, "");
    }

    #[test]
    fn changing_city_keeps_a_shared_district_name() {
        let mut flow = flow(cart_of_450());
        flow.select_city(AddressKind::Delivery, "Istanbul");
        flow.select_district(AddressKind::Delivery, "Merkez").unwrap();

        flow.select_city(AddressKind::Delivery, "Izmir");

        assert_eq!(flow.form(AddressKind::Delivery).district, "Merkez");
    }

    #[test]
    fn district_must_belong_to_a_known_city() {
        let mut flow = flow(cart_of_450());
        flow.select_city(AddressKind::Delivery, "Istanbul");

        let result = flow.select_district(AddressKind::Delivery, "Konak");

        assert!(matches!(result, Err(CheckoutError::DistrictNotInCity)));
        assert_eq!(flow.form(AddressKind::Delivery).district, "");
    }

    #[test]
    fn unknown_city_accepts_free_text_district() {
        let mut flow = flow(cart_of_450());
        flow.select_city(AddressKind::Delivery, "Ankara");

        flow.select_district(AddressKind::Delivery, "Cankaya").unwrap();

        assert_eq!(flow.form(AddressKind::Delivery).district, "Cankaya");
    }

    #[test]
    fn separate_billing_address_is_gated_too() {
        let mut flow = flow(cart_of_450());
        fill_delivery(&mut flow);
        flow.set_same_as_delivery(false);

        assert!(flow.advance().is_err());
        assert_eq!(flow.step(), CheckoutStep::Delivery);

        let billing = flow.form_mut(AddressKind::Billing);
        billing.full_name = "Ada Yilmaz".into();
        billing.email = "billing@example.com".into();
        billing.phone = "+90 555 111 11 11".into();
        billing.line1 = "Ofis Sok. 2".into();
        flow.select_city(AddressKind::Billing, "Izmir");
        flow.select_district(AddressKind::Billing, "Konak").unwrap();

        assert_eq!(flow.advance().unwrap(), CheckoutStep::Payment);
    }

    #[test]
    fn selecting_an_option_requotes() {
        let mut flow = flow(cart_of_450());

        flow.select_shipping_option("express");

        assert_eq!(flow.quote().shipping_cost, lira(49, 90));
        assert_eq!(flow.quote().total, lira(499, 90));
    }

    #[test]
    fn back_retreats_without_gating() {
        let mut flow = flow(cart_of_450());
        fill_delivery(&mut flow);
        flow.advance().unwrap();
        assert_eq!(flow.step(), CheckoutStep::Payment);

        flow.back();

        assert_eq!(flow.step(), CheckoutStep::Delivery);
    }

    #[tokio::test]
    async fn submit_requires_the_confirmation_step() {
        let backend = MockBackend::new();
        let mut flow = flow(cart_of_450());

        let result = flow.submit(backend.as_ref(), UserId::generate()).await;

        assert!(matches!(result, Err(CheckoutError::NotAtConfirmation)));
        assert!(backend.submitted.lock().await.is_empty());
    }

    #[tokio::test]
    async fn submit_is_blocked_until_terms_are_accepted() {
        let backend = MockBackend::new();
        let mut flow = flow(cart_of_450());
        fill_delivery(&mut flow);
        flow.advance().unwrap();
        flow.advance().unwrap();
        assert_eq!(flow.step(), CheckoutStep::Confirmation);

        let result = flow.submit(backend.as_ref(), UserId::generate()).await;

        assert!(matches!(result, Err(CheckoutError::TermsNotAccepted)));
        assert!(flow.validation_error().is_some());
        assert!(backend.submitted.lock().await.is_empty());

        flow.set_terms_accepted(true);
        flow.submit(backend.as_ref(), UserId::generate()).await.unwrap();
        assert_eq!(backend.submitted.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn submit_builds_the_order_from_the_final_quote() {
        let backend = MockBackend::new();
        let user = UserId::generate();
        let mut flow = flow(cart_of_450());
        fill_delivery(&mut flow);
        flow.advance().unwrap();
        flow.advance().unwrap();
        flow.set_terms_accepted(true);

        flow.submit(backend.as_ref(), user).await.unwrap();

        let submitted = backend.submitted.lock().await;
        let draft = &submitted[0];
        assert_eq!(draft.user_id, user);
        assert_eq!(draft.subtotal, lira(450, 0));
        assert_eq!(draft.shipping_cost, lira(29, 90));
        assert_eq!(draft.total, lira(479, 90));
        assert_eq!(draft.shipping_option_id, "standard");
        assert_eq!(draft.delivery, draft.billing);
        assert_eq!(draft.delivery.city, "Istanbul");
        assert_eq!(draft.delivery.district, "Kadikoy");
        assert_eq!(draft.payment_method, PaymentMethod::Card);
    }

    #[tokio::test]
    async fn submit_catches_the_malformed_email_the_gate_let_through() {
        let backend = MockBackend::new();
        let mut flow = flow(cart_of_450());
        fill_delivery(&mut flow);
        flow.form_mut(AddressKind::Delivery).email = "not-an-email".into();
        flow.advance().unwrap();
        flow.advance().unwrap();
        flow.set_terms_accepted(true);

        let result = flow.submit(backend.as_ref(), UserId::generate()).await;

        assert!(matches!(result, Err(CheckoutError::Validation(_))));
        assert!(backend.submitted.lock().await.is_empty());
        // still at confirmation; the user corrects and retries
        assert_eq!(flow.step(), CheckoutStep::Confirmation);
    }

    #[tokio::test]
    async fn failed_submission_keeps_the_flow_at_confirmation() {
        let backend = MockBackend::new();
        backend
            .submit_fails
            .store(true, std::sync::atomic::Ordering::SeqCst);
        let mut flow = flow(cart_of_450());
        fill_delivery(&mut flow);
        flow.advance().unwrap();
        flow.advance().unwrap();
        flow.set_terms_accepted(true);

        let result = flow.submit(backend.as_ref(), UserId::generate()).await;

        assert!(matches!(result, Err(CheckoutError::Backend(_))));
        assert_eq!(flow.step(), CheckoutStep::Confirmation);
    }
}
