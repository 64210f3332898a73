//! Merchant categorization — keyword phase plus oracle phase.
//!
//! Phase 1 is a deterministic keyword table: stable, free, reproducible
//! in tests without network. Phase 2 asks the categorization oracle with
//! a single prompt at temperature zero. Any oracle failure or off-list
//! label degrades to `Uncategorized`; a miscategorized row is acceptable,
//! a dropped row is not.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::oracle::CategoryOracle;

/// Sentinel category when no valid label can be determined.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// One keyword rule: a category and the merchant substrings that map to it.
#[derive(Debug, Clone)]
pub struct KeywordRule {
    pub category: String,
    pub keywords: Vec<String>,
}

impl KeywordRule {
    fn new(category: &str, keywords: &[&str]) -> Self {
        Self {
            category: category.to_string(),
            keywords: keywords.iter().map(|k| k.to_uppercase()).collect(),
        }
    }
}

/// A category scheme: ordered keyword rules plus the closed set of valid
/// labels. Constructed explicitly so tests and alternative ledgers can
/// carry their own scheme.
#[derive(Debug, Clone)]
pub struct CategoryScheme {
    rules: Vec<KeywordRule>,
    categories: BTreeSet<String>,
}

impl CategoryScheme {
    pub fn new(rules: Vec<KeywordRule>, categories: impl IntoIterator<Item = String>) -> Self {
        Self {
            rules,
            categories: categories.into_iter().collect(),
        }
    }

    /// The household BCR scheme: Spanish spending categories with
    /// keyword rules for the recurring merchants.
    pub fn bcr_default() -> Self {
        let rules = vec![
            KeywordRule::new(
                "Mercado (alimentos, aseo hogar)",
                &["MXM", "SUPER", "MAS X MENOS", "PRICE SMART", "FRESK MARKET"],
            ),
            KeywordRule::new("Combustible", &["SERVICENTRO", "ESTACION"]),
            KeywordRule::new(
                "Domicilios/restaurantes",
                &["SODA", "RESTAURANT", "SUBWAY", "CAFE", "COFEE", "PIZZA"],
            ),
            KeywordRule::new("Agua", &["AGUA"]),
            KeywordRule::new("Electricidad", &["ELECTRICIDAD", "ICE"]),
            KeywordRule::new("Internet", &["INTERNET", "CABLE"]),
            KeywordRule::new("Transporte UBER", &["UBER"]),
            KeywordRule::new("YouTube Premium", &["YOUTUBE"]),
            KeywordRule::new("Chat GPT", &["GPT", "CHATGPT"]),
            KeywordRule::new("Plan funerario", &["FUNERARIO"]),
            KeywordRule::new("Hipoteca Casa", &["HIPOTECA", "VIVIENDA"]),
            KeywordRule::new("Plan celular", &["CELULAR", "KOLBI", "PLAN"]),
        ];

        let categories = [
            "Agua",
            "Agua Desamparados",
            "Chat GPT",
            "Combustible",
            "Consultas médicas",
            "Diversión",
            "Domicilios/restaurantes",
            "Educación",
            "Electricidad",
            "Fruta/Snacks/Café",
            "Hipoteca Casa",
            "Internet",
            "Mantenimiento vehículo",
            "Mantenimiento hogar",
            "Medicamentos",
            "Mercado (alimentos, aseo hogar)",
            "Mesada Gabriel",
            "Mesada Oscar",
            "Peluquería",
            "Plan celular",
            "Plan funerario",
            "Transporte UBER",
            "Vacaciones",
            "Vestuario (ropa/zapato/accesorios)",
            "YouTube Premium",
        ]
        .into_iter()
        .map(String::from);

        Self::new(rules, categories)
    }

    /// Phase 1: first rule whose keyword set substring-matches the
    /// case-normalized merchant wins.
    pub fn keyword_match(&self, merchant: &str) -> Option<&str> {
        let merchant = merchant.to_uppercase();
        self.rules
            .iter()
            .find(|rule| rule.keywords.iter().any(|k| merchant.contains(k.as_str())))
            .map(|rule| rule.category.as_str())
    }

    /// Exact, case-sensitive membership check. No fuzzy correction.
    pub fn contains(&self, category: &str) -> bool {
        self.categories.contains(category)
    }

    /// Build the oracle prompt: merchant, keyword rules (for consistency
    /// with phase 1), and the full closed label set.
    pub fn build_prompt(&self, merchant: &str) -> String {
        let mut prompt = String::with_capacity(1024);
        prompt.push_str(
            "Classify this merchant into ONE category. \
             Reply with ONLY the category name, nothing else.\n\n",
        );
        prompt.push_str(&format!("Merchant: {merchant}\n\n"));

        prompt.push_str(
            "## CLASSIFICATION RULES (apply these first by searching keywords, case-insensitive):\n\n",
        );
        for rule in &self.rules {
            prompt.push_str(&format!(
                "{}\nKeywords: {}\n\n",
                rule.category,
                rule.keywords.join(", ")
            ));
        }

        prompt.push_str("## ALL VALID CATEGORIES (use if no keyword rule matches):\n");
        for category in &self.categories {
            prompt.push_str(&format!("- {category}\n"));
        }
        prompt.push_str("\nReply with ONLY the exact category name.");
        prompt
    }
}

/// Merchant classifier: keyword phase first, oracle phase only when no
/// rule matches. Infallible by contract — classification failure must
/// never block ledger durability.
pub struct Classifier {
    scheme: CategoryScheme,
    oracle: Arc<dyn CategoryOracle>,
}

impl Classifier {
    pub fn new(scheme: CategoryScheme, oracle: Arc<dyn CategoryOracle>) -> Self {
        Self { scheme, oracle }
    }

    /// Resolve a merchant to a category label from the scheme's closed
    /// set, or `Uncategorized`.
    pub async fn classify(&self, merchant: &str) -> String {
        if merchant.trim().is_empty() {
            warn!("Empty merchant name, returning sentinel");
            return UNCATEGORIZED.to_string();
        }

        if let Some(category) = self.scheme.keyword_match(merchant) {
            debug!(merchant, category, "Categorized via keyword rule");
            return category.to_string();
        }

        let prompt = self.scheme.build_prompt(merchant);
        let candidate = match self.oracle.complete(&prompt).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                warn!(merchant, error = %e, "Oracle call failed, returning sentinel");
                return UNCATEGORIZED.to_string();
            }
        };

        if self.scheme.contains(&candidate) {
            debug!(merchant, category = %candidate, "Categorized via oracle");
            candidate
        } else {
            warn!(
                merchant,
                candidate = %candidate,
                "Oracle returned a label outside the category set"
            );
            UNCATEGORIZED.to_string()
        }
    }
}
