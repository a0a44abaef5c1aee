//! Canned lookup tools shared by the demo pipelines.
//!
//! Search tools return fixed summaries built from the query; order, logistics
//! and FAQ lookups read small in-process tables. A miss is a "not found" text,
//! never an error.

use stagegraph::{FnTool, ToolRegistry};

pub const WEB_SEARCH: &str = "web_search";
pub const ACADEMIC_SEARCH: &str = "search_academic_papers";
pub const MARKET_DATA: &str = "search_market_data";
pub const HOT_TOPICS: &str = "search_hot_topics";
pub const COMPETITOR_CONTENT: &str = "search_competitor_content";
pub const FAQ_SEARCH: &str = "search_faq";
pub const ORDER_STATUS: &str = "query_order";
pub const LOGISTICS: &str = "query_logistics";
pub const DIAGNOSE: &str = "diagnose_issue";
pub const USER_LOCATION: &str = "get_user_location";
pub const WEATHER: &str = "get_weather_for_location";

/// Reply of `search_faq` when no entry matches.
pub const FAQ_MISS: &str = "No matching FAQ entry found.";

/// Replacement for masked words in outgoing replies.
pub const MASK: &str = "***";

const SENSITIVE_WORDS: &[&str] = &["idiot", "stupid", "scam", "damn"];

struct Order {
    id: &'static str,
    status: &'static str,
    tracking: &'static str,
    items: &'static str,
    amount: f64,
    created: &'static str,
}

const ORDERS: &[Order] = &[
    Order {
        id: "12345",
        status: "shipped",
        tracking: "SF1234567890",
        items: "wireless earbuds x1, phone case x2",
        amount: 299.0,
        created: "2026-02-18",
    },
    Order {
        id: "67890",
        status: "in delivery",
        tracking: "YT9876543210",
        items: "smart watch x1",
        amount: 799.0,
        created: "2026-02-16",
    },
];

const FAQ: &[(&str, &str)] = &[
    (
        "return",
        "Returns are accepted within 7 days of delivery for unused items in original packaging. Start a return from the order page.",
    ),
    (
        "exchange",
        "Exchanges are available within 15 days for quality issues. Contact support with photos of the problem.",
    ),
    (
        "invoice",
        "Electronic invoices are issued automatically after delivery and can be downloaded from the order page.",
    ),
    (
        "coupon",
        "Only one coupon applies per order. Coupons cannot be combined with flash-sale prices.",
    ),
    (
        "membership",
        "Members earn 1 point per unit spent and get free shipping on every order.",
    ),
    (
        "shipping",
        "Orders placed before 4pm ship the same day. Standard delivery takes 2-4 days.",
    ),
];

pub fn web_search(query: &str) -> String {
    format!(
        "Search results for '{query}':\n\
         1. Industry overview: adoption of {query} keeps accelerating, with double-digit annual growth.\n\
         2. News: several major vendors announced new {query} products this quarter.\n\
         3. Commentary: analysts point to cost and regulation as the main open questions."
    )
}

pub fn search_academic_papers(query: &str) -> String {
    format!(
        "Academic papers on '{query}':\n\
         - Survey (2025): taxonomy of current approaches and open problems.\n\
         - Empirical study (2024): benchmarks across five representative settings.\n\
         - Position paper (2025): long-term risks and evaluation gaps."
    )
}

pub fn search_market_data(query: &str) -> String {
    format!(
        "Market data for '{query}':\n\
         - Estimated market size: 12.4B (2025), projected CAGR 18%.\n\
         - Top three vendors hold about 55% share.\n\
         - Funding rounds in the last 12 months: 37."
    )
}

pub fn search_hot_topics(topic: &str) -> String {
    format!(
        "Trending angles for '{topic}':\n\
         1. Beginner guides are the most shared format this week.\n\
         2. Contrarian takes on {topic} drive the most comments.\n\
         3. Short lists with concrete numbers outperform long essays."
    )
}

pub fn search_competitor_content(topic: &str) -> String {
    format!(
        "Competitor content on '{topic}':\n\
         - Top article: '10 things nobody tells you about {topic}' (high engagement).\n\
         - Common gap: few pieces cite sources or recent data.\n\
         - Typical length: 1,200-1,800 words."
    )
}

/// First FAQ entry whose keyword occurs in `question`.
fn faq_lookup(question: &str) -> Option<&'static str> {
    let question = question.to_lowercase();
    FAQ.iter()
        .find(|(keyword, _)| question.contains(keyword))
        .map(|(_, answer)| *answer)
}

pub fn search_faq(question: &str) -> String {
    faq_lookup(question)
        .map(str::to_string)
        .unwrap_or_else(|| FAQ_MISS.to_string())
}

fn find_order(text: &str) -> Option<&'static Order> {
    ORDERS.iter().find(|o| text.contains(o.id))
}

/// Order id (5+ digits) mentioned in `text`, if any.
pub fn extract_order_id(text: &str) -> Option<String> {
    text.split(|c: char| !c.is_ascii_digit())
        .find(|run| run.len() >= 5)
        .map(str::to_string)
}

pub fn query_order(order_id: &str) -> String {
    match find_order(order_id.trim()) {
        Some(o) => format!(
            "Order {}: {} | items: {} | amount: {:.2} | placed: {} | tracking: {}",
            o.id, o.status, o.items, o.amount, o.created, o.tracking
        ),
        None => format!("Order {} not found. Please check the order number.", order_id.trim()),
    }
}

pub fn query_logistics(tracking: &str) -> String {
    let tracking = tracking.trim();
    if tracking.starts_with("SF") {
        format!("Parcel {tracking} (SF Express): left the sorting center, expected delivery tomorrow.")
    } else if tracking.starts_with("YT") {
        format!("Parcel {tracking} (YTO Express): out for delivery with the local courier today.")
    } else {
        format!("No logistics record for {tracking}.")
    }
}

/// Tracking number of a known order.
pub fn tracking_for(order_id: &str) -> Option<&'static str> {
    find_order(order_id).map(|o| o.tracking)
}

pub fn diagnose_issue(description: &str) -> String {
    let d = description.to_lowercase();
    if d.contains("login") || d.contains("log in") || d.contains("password") {
        "Login problem: 1) clear the app cache 2) reset your password from the login page 3) make sure the app is up to date.".to_string()
    } else if d.contains("crash") {
        "Crash: 1) update to the latest version 2) restart the device 3) reinstall the app if it keeps crashing.".to_string()
    } else if d.contains("slow") || d.contains("lag") {
        "Slowness: 1) check your network connection 2) close background apps 3) clear cached data in settings.".to_string()
    } else {
        "Please describe the problem in more detail: device model, app version and the steps that lead to it.".to_string()
    }
}

/// Location on file for a user id: "1" is Florida, everyone else SF.
pub fn get_user_location(user_id: &str) -> String {
    if user_id.trim() == "1" { "Florida" } else { "SF" }.to_string()
}

pub fn get_weather_for_location(city: &str) -> String {
    format!("{} is always sunny!", city.trim())
}

/// Replaces sensitive words (case-insensitive, whole words only) with `MASK`.
/// Returns the masked text and whether anything was replaced.
pub fn mask_sensitive(text: &str) -> (String, bool) {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let mut masked = false;
    let mut after_word_char = false;
    'scan: while let Some(c) = rest.chars().next() {
        if !after_word_char {
            for word in SENSITIVE_WORDS {
                let whole_word = rest
                    .get(..word.len())
                    .is_some_and(|head| head.eq_ignore_ascii_case(word))
                    && !rest[word.len()..]
                        .chars()
                        .next()
                        .is_some_and(char::is_alphanumeric);
                if whole_word {
                    out.push_str(MASK);
                    rest = &rest[word.len()..];
                    masked = true;
                    after_word_char = true;
                    continue 'scan;
                }
            }
        }
        out.push(c);
        after_word_char = c.is_alphanumeric();
        rest = &rest[c.len_utf8()..];
    }
    (out, masked)
}

/// Registry with every demo tool.
pub fn registry() -> ToolRegistry {
    let mut reg = ToolRegistry::new();
    reg.register(FnTool::new(WEB_SEARCH, "Searches the web", "query", web_search))
        .register(FnTool::new(
            ACADEMIC_SEARCH,
            "Searches academic papers",
            "query",
            search_academic_papers,
        ))
        .register(FnTool::new(
            MARKET_DATA,
            "Looks up market size and funding data",
            "query",
            search_market_data,
        ))
        .register(FnTool::new(
            HOT_TOPICS,
            "Lists trending angles for a topic",
            "topic",
            search_hot_topics,
        ))
        .register(FnTool::new(
            COMPETITOR_CONTENT,
            "Summarizes competing content on a topic",
            "topic",
            search_competitor_content,
        ))
        .register(FnTool::new(FAQ_SEARCH, "Searches the FAQ", "question", search_faq))
        .register(FnTool::new(
            ORDER_STATUS,
            "Looks up an order by id",
            "order_id",
            query_order,
        ))
        .register(FnTool::new(
            LOGISTICS,
            "Tracks a parcel by tracking number",
            "tracking_number",
            query_logistics,
        ))
        .register(FnTool::new(
            DIAGNOSE,
            "Suggests fixes for a technical problem",
            "description",
            diagnose_issue,
        ))
        .register(FnTool::new(
            USER_LOCATION,
            "Looks up the location of a user by user id",
            "user_id",
            get_user_location,
        ))
        .register(FnTool::new(
            WEATHER,
            "Gets the weather for a city",
            "city",
            get_weather_for_location,
        ));
    reg
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn known_and_unknown_orders() {
        assert!(query_order("12345").contains("SF1234567890"));
        assert!(query_order("67890").contains("in delivery"));
        assert!(query_order("99999").contains("not found"));
    }

    #[test]
    fn logistics_by_carrier_prefix() {
        assert!(query_logistics("SF1234567890").contains("SF Express"));
        assert!(query_logistics("YT9876543210").contains("YTO"));
        assert!(query_logistics("ZZ1").contains("No logistics record"));
    }

    #[test]
    fn order_id_extraction() {
        assert_eq!(extract_order_id("where is order 12345?"), Some("12345".into()));
        assert_eq!(extract_order_id("order #42"), None);
    }

    #[test]
    fn faq_matches_keywords() {
        assert!(faq_lookup("How do I RETURN an item?").is_some());
        assert!(faq_lookup("Do you sell gift cards?").is_none());
        assert_eq!(search_faq("gift cards"), FAQ_MISS);
    }

    #[test]
    fn diagnosis_by_keyword() {
        assert!(diagnose_issue("I can't login").starts_with("Login"));
        assert!(diagnose_issue("app crashes on start").starts_with("Crash"));
        assert!(diagnose_issue("very slow").starts_with("Slowness"));
        assert!(diagnose_issue("something odd").contains("more detail"));
    }

    #[test]
    fn masking_is_case_insensitive() {
        let (text, masked) = mask_sensitive("This is a Scam, you idiot");
        assert!(masked);
        assert_eq!(text, "This is a ***, you ***");
        let (text, masked) = mask_sensitive("all good");
        assert!(!masked);
        assert_eq!(text, "all good");
    }

    #[test]
    fn masking_leaves_words_that_contain_sensitive_ones() {
        for clean in ["scampi for dinner", "Scamper off", "damnation", "idiotic-ish? no: xidiot"] {
            let (text, masked) = mask_sensitive(clean);
            assert!(!masked, "{clean}");
            assert_eq!(text, clean);
        }
        let (text, masked) = mask_sensitive("scam! (damn) scampi, SCAM");
        assert!(masked);
        assert_eq!(text, "***! (***) scampi, ***");
    }

    #[test]
    fn weather_tools() {
        assert_eq!(get_user_location("1"), "Florida");
        assert_eq!(get_user_location("42"), "SF");
        assert_eq!(get_weather_for_location("Florida"), "Florida is always sunny!");
    }

    #[tokio::test]
    async fn registry_executes_by_name() {
        let reg = registry();
        assert_eq!(reg.len(), 11);
        let out = reg
            .execute_text(ORDER_STATUS, json!({"order_id": "12345"}))
            .await
            .unwrap();
        assert!(out.contains("shipped"));
        assert!(reg.execute_text(ORDER_STATUS, json!({})).await.is_err());
    }
}
