//! Tagged queue payloads, one schema per data type.
//!
//! Payloads are validated before they enter the queue so the sync runner only
//! ever pushes well-formed rows. Each variant knows the remote table(s) it
//! lands in and the natural key the upsert is keyed on.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

use super::ledger::{CashFlowSource, CashTransactionType};
use crate::error::{Error, Result};
use crate::remote::Table;
use crate::util::round_cents;

/// Data types that can be queued offline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Invoice,
    Product,
    Customer,
    Expense,
    CashTransaction,
}

impl DataType {
    /// Column value stored in the queue table
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Invoice => "invoice",
            Self::Product => "product",
            Self::Customer => "customer",
            Self::Expense => "expense",
            Self::CashTransaction => "cash_transaction",
        }
    }

    /// Remote table holding records of this type
    #[must_use]
    pub const fn table(self) -> Table {
        match self {
            Self::Invoice => Table::Invoices,
            Self::Product => Table::Products,
            Self::Customer => Table::Customers,
            Self::Expense => Table::Expenses,
            Self::CashTransaction => Table::CashTransactions,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "invoice" => Ok(Self::Invoice),
            "product" => Ok(Self::Product),
            "customer" => Ok(Self::Customer),
            "expense" => Ok(Self::Expense),
            "cash_transaction" | "cash" => Ok(Self::CashTransaction),
            other => Err(Error::InvalidInput(format!("unknown data type '{other}'"))),
        }
    }
}

/// Invoice header with its line items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoicePayload {
    pub id: String,
    pub invoice_number: String,
    #[serde(default)]
    pub customer_id: Option<String>,
    pub total_amount: f64,
    #[serde(default = "default_invoice_status")]
    pub status: String,
    #[serde(default)]
    pub items: Vec<InvoiceItemPayload>,
}

/// Invoice line item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceItemPayload {
    pub id: String,
    pub product_id: String,
    pub quantity: f64,
    pub unit_price: f64,
}

/// Product catalogue entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductPayload {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub sku: Option<String>,
    pub price: f64,
    #[serde(default)]
    pub stock_quantity: i64,
}

/// Customer record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerPayload {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Expense-system record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpensePayload {
    pub id: String,
    pub amount: f64,
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
    pub expense_date: NaiveDate,
    #[serde(default = "default_true")]
    pub cash_flow_sync: bool,
}

/// Cash-flow ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashTransactionPayload {
    pub id: String,
    pub amount: f64,
    pub description: String,
    pub transaction_type: CashTransactionType,
    #[serde(default)]
    pub source: CashFlowSource,
    pub transaction_date: NaiveDate,
}

fn default_invoice_status() -> String {
    "draft".to_string()
}

const fn default_true() -> bool {
    true
}

/// Queue payload tagged by data type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "data_type", content = "content", rename_all = "snake_case")]
pub enum OfflinePayload {
    Invoice(InvoicePayload),
    Product(ProductPayload),
    Customer(CustomerPayload),
    Expense(ExpensePayload),
    CashTransaction(CashTransactionPayload),
}

/// One upsert the sync runner sends to the remote store
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteWrite {
    pub table: Table,
    pub rows: Vec<Value>,
    pub on_conflict: &'static str,
}

impl OfflinePayload {
    /// Build a payload from a data type, its natural key and a JSON body.
    ///
    /// A body without an `id` field takes `data_id`. The result is validated.
    pub fn from_parts(data_type: DataType, data_id: &str, mut content: Value) -> Result<Self> {
        let Some(object) = content.as_object_mut() else {
            return Err(Error::InvalidInput(
                "payload content must be a JSON object".to_string(),
            ));
        };
        object
            .entry("id")
            .or_insert_with(|| Value::String(data_id.to_string()));

        let payload: Self = serde_json::from_value(json!({
            "data_type": data_type.as_str(),
            "content": content,
        }))
        .map_err(|error| Error::InvalidInput(format!("invalid {data_type} payload: {error}")))?;

        if payload.data_id() != data_id {
            return Err(Error::InvalidInput(format!(
                "payload id '{}' does not match data id '{data_id}'",
                payload.data_id()
            )));
        }
        payload.validate()?;
        Ok(payload)
    }

    /// Data type of this payload
    #[must_use]
    pub const fn data_type(&self) -> DataType {
        match self {
            Self::Invoice(_) => DataType::Invoice,
            Self::Product(_) => DataType::Product,
            Self::Customer(_) => DataType::Customer,
            Self::Expense(_) => DataType::Expense,
            Self::CashTransaction(_) => DataType::CashTransaction,
        }
    }

    /// Natural key of the record
    #[must_use]
    pub fn data_id(&self) -> &str {
        match self {
            Self::Invoice(invoice) => &invoice.id,
            Self::Product(product) => &product.id,
            Self::Customer(customer) => &customer.id,
            Self::Expense(expense) => &expense.id,
            Self::CashTransaction(entry) => &entry.id,
        }
    }

    /// Check the schema rules of the variant
    pub fn validate(&self) -> Result<()> {
        require_text(self.data_id(), "id")?;
        match self {
            Self::Invoice(invoice) => {
                require_text(&invoice.invoice_number, "invoice_number")?;
                require_amount(invoice.total_amount, "total_amount", false)?;
                for item in &invoice.items {
                    require_text(&item.id, "item id")?;
                    require_text(&item.product_id, "item product_id")?;
                    require_amount(item.quantity, "item quantity", true)?;
                    require_amount(item.unit_price, "item unit_price", false)?;
                }
            }
            Self::Product(product) => {
                require_text(&product.name, "name")?;
                require_amount(product.price, "price", false)?;
            }
            Self::Customer(customer) => {
                require_text(&customer.name, "name")?;
                if let Some(email) = customer.email.as_deref() {
                    if !email.trim().is_empty() && !email.contains('@') {
                        return Err(Error::InvalidInput(format!(
                            "customer email '{email}' is not valid"
                        )));
                    }
                }
            }
            Self::Expense(expense) => {
                require_text(&expense.description, "description")?;
                require_amount(expense.amount, "amount", true)?;
            }
            Self::CashTransaction(entry) => {
                require_text(&entry.description, "description")?;
                require_amount(entry.amount, "amount", true)?;
            }
        }
        Ok(())
    }

    /// Remote upserts for this payload, in push order.
    ///
    /// Invoices produce the header row first and their line items second.
    pub fn remote_writes(&self, user_id: &str) -> Vec<RemoteWrite> {
        match self {
            Self::Invoice(invoice) => {
                let mut writes = vec![RemoteWrite {
                    table: Table::Invoices,
                    rows: vec![json!({
                        "id": invoice.id,
                        "user_id": user_id,
                        "invoice_number": invoice.invoice_number,
                        "customer_id": invoice.customer_id,
                        "total_amount": round_cents(invoice.total_amount),
                        "status": invoice.status,
                    })],
                    on_conflict: "id",
                }];
                if !invoice.items.is_empty() {
                    writes.push(RemoteWrite {
                        table: Table::InvoiceItems,
                        rows: invoice
                            .items
                            .iter()
                            .map(|item| {
                                json!({
                                    "id": item.id,
                                    "invoice_id": invoice.id,
                                    "product_id": item.product_id,
                                    "quantity": item.quantity,
                                    "unit_price": round_cents(item.unit_price),
                                    "total_price": round_cents(item.quantity * item.unit_price),
                                })
                            })
                            .collect(),
                        on_conflict: "id",
                    });
                }
                writes
            }
            Self::Product(product) => vec![single_write(
                Table::Products,
                json!({
                    "id": product.id,
                    "user_id": user_id,
                    "name": product.name.trim(),
                    "sku": product.sku,
                    "price": round_cents(product.price),
                    "stock_quantity": product.stock_quantity,
                }),
            )],
            Self::Customer(customer) => vec![single_write(
                Table::Customers,
                json!({
                    "id": customer.id,
                    "user_id": user_id,
                    "name": customer.name.trim(),
                    "phone": customer.phone,
                    "email": customer.email,
                }),
            )],
            Self::Expense(expense) => vec![single_write(
                Table::Expenses,
                json!({
                    "id": expense.id,
                    "user_id": user_id,
                    "amount": round_cents(expense.amount),
                    "description": expense.description.trim(),
                    "category": expense.category,
                    "expense_date": expense.expense_date,
                    "cash_flow_sync": expense.cash_flow_sync,
                }),
            )],
            Self::CashTransaction(entry) => vec![single_write(
                Table::CashTransactions,
                json!({
                    "id": entry.id,
                    "user_id": user_id,
                    "amount": round_cents(entry.amount),
                    "description": entry.description.trim(),
                    "transaction_type": entry.transaction_type,
                    "source": entry.source,
                    "transaction_date": entry.transaction_date,
                }),
            )],
        }
    }
}

fn single_write(table: Table, row: Value) -> RemoteWrite {
    RemoteWrite {
        table,
        rows: vec![row],
        on_conflict: "id",
    }
}

fn require_text(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(Error::InvalidInput(format!("{field} cannot be empty")))
    } else {
        Ok(())
    }
}

fn require_amount(value: f64, field: &str, strictly_positive: bool) -> Result<()> {
    if !value.is_finite() {
        return Err(Error::InvalidInput(format!("{field} must be a number")));
    }
    if strictly_positive && value <= 0.0 {
        return Err(Error::InvalidInput(format!("{field} must be positive")));
    }
    if value < 0.0 {
        return Err(Error::InvalidInput(format!("{field} cannot be negative")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn from_parts_fills_missing_id() {
        let payload = OfflinePayload::from_parts(
            DataType::Invoice,
            "inv-1",
            json!({"invoice_number": "INV-0001", "total_amount": 150.0}),
        )
        .unwrap();

        assert_eq!(payload.data_type(), DataType::Invoice);
        assert_eq!(payload.data_id(), "inv-1");
        let OfflinePayload::Invoice(invoice) = payload else {
            panic!("expected invoice payload");
        };
        assert_eq!(invoice.status, "draft");
        assert!(invoice.items.is_empty());
    }

    #[test]
    fn from_parts_rejects_mismatched_id() {
        let error = OfflinePayload::from_parts(
            DataType::Product,
            "p-1",
            json!({"id": "p-2", "name": "Tea", "price": 3.5}),
        )
        .unwrap_err();
        assert!(error.to_string().contains("does not match"));
    }

    #[test]
    fn from_parts_rejects_unknown_shape() {
        assert!(OfflinePayload::from_parts(DataType::Customer, "c-1", json!("text")).is_err());
        assert!(OfflinePayload::from_parts(DataType::Customer, "c-1", json!({"phone": "1"})).is_err());
    }

    #[test]
    fn validation_rules_per_variant() {
        let negative_price = OfflinePayload::from_parts(
            DataType::Product,
            "p-1",
            json!({"name": "Tea", "price": -1.0}),
        );
        assert!(negative_price.is_err());

        let bad_email = OfflinePayload::from_parts(
            DataType::Customer,
            "c-1",
            json!({"name": "Salma", "email": "salma.example.com"}),
        );
        assert!(bad_email.is_err());

        let zero_expense = OfflinePayload::from_parts(
            DataType::Expense,
            "e-1",
            json!({"amount": 0.0, "description": "Rent", "expense_date": "2024-03-01"}),
        );
        assert!(zero_expense.is_err());

        let zero_quantity = OfflinePayload::from_parts(
            DataType::Invoice,
            "inv-2",
            json!({
                "invoice_number": "INV-0002",
                "total_amount": 10.0,
                "items": [{"id": "it-1", "product_id": "p-1", "quantity": 0.0, "unit_price": 10.0}]
            }),
        );
        assert!(zero_quantity.is_err());
    }

    #[test]
    fn invoice_writes_header_then_items() {
        let payload = OfflinePayload::from_parts(
            DataType::Invoice,
            "inv-1",
            json!({
                "invoice_number": "INV-0001",
                "total_amount": 30.0,
                "items": [
                    {"id": "it-1", "product_id": "p-1", "quantity": 2.0, "unit_price": 10.0},
                    {"id": "it-2", "product_id": "p-2", "quantity": 1.0, "unit_price": 10.0}
                ]
            }),
        )
        .unwrap();

        let writes = payload.remote_writes("user-1");
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].table, Table::Invoices);
        assert_eq!(writes[0].rows[0]["user_id"], "user-1");
        assert_eq!(writes[1].table, Table::InvoiceItems);
        assert_eq!(writes[1].rows.len(), 2);
        assert_eq!(writes[1].rows[0]["invoice_id"], "inv-1");
        assert_eq!(writes[1].rows[0]["total_price"], 20.0);
    }

    #[test]
    fn data_type_parse_accepts_aliases() {
        assert_eq!("cash-transaction".parse::<DataType>().unwrap(), DataType::CashTransaction);
        assert_eq!("INVOICE".parse::<DataType>().unwrap(), DataType::Invoice);
        assert!("order".parse::<DataType>().is_err());
    }

    #[test]
    fn payload_json_is_tagged() {
        let payload = OfflinePayload::from_parts(
            DataType::Customer,
            "c-1",
            json!({"name": "Salma"}),
        )
        .unwrap();
        let encoded = serde_json::to_value(&payload).unwrap();
        assert_eq!(encoded["data_type"], "customer");
        assert_eq!(encoded["content"]["name"], "Salma");
    }
}
