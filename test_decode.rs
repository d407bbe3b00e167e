use email_privacy_filter::decode;

fn main() {
    let encoded = "PFByaXZhY3lQb2xpY3k+PG1ldGFkYXRhPjxjcmVhdG9yPmhyQGNvbXBhbnkuY29tPC9jcmVhdG9yPjwvbWV0YWRhdGE+PHJ1bGVzPjxydWxlIGlkPSJuby1mb3J3YXJkIj48ZGVzY3JpcHRpb24+V2FybiBhYm91dCBmb3J3YXJkaW5nPC9kZXNjcmlwdGlvbj48YWN0aW9uIHR5cGU9Indhcm4iIG1lc3NhZ2U9IkRvIG5vdCBmb3J3YXJkIHRoaXMgZW1haWwiLz48L3J1bGU+PC9ydWxlcz48L1ByaXZhY3lQb2xpY3k+";
    match decode(encoded) {
        Ok(policy) => {
            println!("Creator: {}", policy.creator);
            for rule in &policy.rules {
                println!("Rule {}: {} ({})", rule.id, rule.description, rule.action.kind);
            }
        }
        Err(e) => println!("Decode failed: {}", e),
    }
}
