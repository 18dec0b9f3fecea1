use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::money::money_mul;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SkuId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckoutItemId(pub String);

/// Catalog data for a SKU. A SKU without a price prices at zero.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sku {
    pub id: SkuId,
    pub name: String,
    pub unit_price: Option<Decimal>,
}

/// A cart row as submitted by the shopper, before catalog resolution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub id: CheckoutItemId,
    pub sku_id: SkuId,
    pub quantity: u32,
    #[serde(default = "default_selected")]
    pub selected: bool,
}

fn default_selected() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutItem {
    id: CheckoutItemId,
    sku_id: SkuId,
    quantity: u32,
    selected: bool,
    sku: Option<Sku>,
}

impl CheckoutItem {
    pub fn new(
        id: CheckoutItemId,
        sku_id: SkuId,
        quantity: u32,
        selected: bool,
        sku: Option<Sku>,
    ) -> Result<Self, DomainError> {
        if sku_id.0.trim().is_empty() {
            return Err(DomainError::InvalidCheckoutItem {
                item_id: id,
                reason: "sku id is required".to_owned(),
            });
        }
        if quantity == 0 {
            return Err(DomainError::InvalidCheckoutItem {
                item_id: id,
                reason: "quantity must be a positive integer".to_owned(),
            });
        }
        if let Some(sku) = &sku {
            if sku.id != sku_id {
                return Err(DomainError::InvalidCheckoutItem {
                    item_id: id,
                    reason: format!("sku reference `{}` does not match `{}`", sku.id.0, sku_id.0),
                });
            }
        }

        Ok(Self { id, sku_id, quantity, selected, sku })
    }

    pub fn from_line(line: CartLine, sku: Option<Sku>) -> Result<Self, DomainError> {
        Self::new(line.id, line.sku_id, line.quantity, line.selected, sku)
    }

    pub fn id(&self) -> &CheckoutItemId {
        &self.id
    }

    pub fn sku_id(&self) -> &SkuId {
        &self.sku_id
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn selected(&self) -> bool {
        self.selected
    }

    pub fn sku(&self) -> Option<&Sku> {
        self.sku.as_ref()
    }

    pub fn unit_price(&self) -> Option<Decimal> {
        self.sku.as_ref().and_then(|sku| sku.unit_price)
    }

    /// `unit_price * quantity` for a selected, priced item; `None` otherwise.
    pub fn line_amount(&self) -> Option<Decimal> {
        if !self.selected {
            return None;
        }
        self.unit_price().map(|price| money_mul(price, self.quantity))
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{CheckoutItem, CheckoutItemId, Sku, SkuId};
    use crate::errors::DomainError;

    fn sku(id: &str, price: Option<Decimal>) -> Sku {
        Sku { id: SkuId(id.to_owned()), name: format!("{id} name"), unit_price: price }
    }

    #[test]
    fn rejects_zero_quantity_and_blank_sku() {
        let zero = CheckoutItem::new(
            CheckoutItemId("row-1".to_owned()),
            SkuId("sku-1".to_owned()),
            0,
            true,
            None,
        );
        assert!(matches!(zero, Err(DomainError::InvalidCheckoutItem { .. })));

        let blank = CheckoutItem::new(
            CheckoutItemId("row-2".to_owned()),
            SkuId("  ".to_owned()),
            1,
            true,
            None,
        );
        assert!(matches!(blank, Err(DomainError::InvalidCheckoutItem { .. })));
    }

    #[test]
    fn rejects_mismatched_sku_reference() {
        let result = CheckoutItem::new(
            CheckoutItemId("row-1".to_owned()),
            SkuId("sku-1".to_owned()),
            1,
            true,
            Some(sku("sku-2", Some(Decimal::ONE))),
        );
        assert!(matches!(result, Err(DomainError::InvalidCheckoutItem { .. })));
    }

    #[test]
    fn line_amount_skips_unselected_and_unpriced_items() {
        let priced = CheckoutItem::new(
            CheckoutItemId("row-1".to_owned()),
            SkuId("sku-1".to_owned()),
            3,
            true,
            Some(sku("sku-1", Some(Decimal::new(433, 2)))),
        )
        .expect("valid item");
        assert_eq!(priced.line_amount(), Some(Decimal::new(1299, 2)));

        let unselected = CheckoutItem::new(
            CheckoutItemId("row-2".to_owned()),
            SkuId("sku-1".to_owned()),
            3,
            false,
            Some(sku("sku-1", Some(Decimal::new(433, 2)))),
        )
        .expect("valid item");
        assert_eq!(unselected.line_amount(), None);

        let missing_sku = CheckoutItem::new(
            CheckoutItemId("row-3".to_owned()),
            SkuId("sku-9".to_owned()),
            1,
            true,
            None,
        )
        .expect("valid item");
        assert_eq!(missing_sku.line_amount(), None);

        let unpriced = CheckoutItem::new(
            CheckoutItemId("row-4".to_owned()),
            SkuId("sku-4".to_owned()),
            1,
            true,
            Some(sku("sku-4", None)),
        )
        .expect("valid item");
        assert_eq!(unpriced.line_amount(), None);
    }
}
