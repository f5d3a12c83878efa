use std::collections::HashSet;

use turtle_attack::engine::http::{
    canonical_header_key, gibberish_value, start_line, write_http_header, write_http_line,
    DEFAULT_USER_AGENTS, GIBBERISH_SIZE,
};
use turtle_attack::engine::random::rand_index;

fn is_token_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'
}

#[test]
fn test_gibberish_shape() {
    for _ in 0..500 {
        let token = gibberish_value(rand_index, GIBBERISH_SIZE);
        assert_eq!(token.len(), GIBBERISH_SIZE);
        assert!(token.chars().all(is_token_char), "bad char in {:?}", token);
        assert!(!token.starts_with('-'), "leading dash in {:?}", token);
        assert!(!token.ends_with('-'), "trailing dash in {:?}", token);
    }
}

#[test]
fn test_gibberish_pinned_random_source() {
    // Highest index picks the last char of each table.
    assert_eq!(gibberish_value(|n| n - 1, 5), "9---9");
    assert_eq!(gibberish_value(|_| 0, 5), "aaaaa");
}

#[test]
fn test_gibberish_small_sizes() {
    assert_eq!(gibberish_value(|_| 0, 0), "");
    assert_eq!(gibberish_value(|n| n - 1, 1), "9");
    assert_eq!(gibberish_value(|n| n - 1, 2), "99");
}

#[test]
fn test_gibberish_varies() {
    let tokens: HashSet<String> = (0..50)
        .map(|_| gibberish_value(rand_index, GIBBERISH_SIZE))
        .collect();
    assert!(tokens.len() > 1);
}

#[test]
fn test_canonical_header_key() {
    assert_eq!(canonical_header_key("host"), "Host");
    assert_eq!(canonical_header_key("user-agent"), "User-Agent");
    assert_eq!(canonical_header_key("X-FORWARDED-FOR"), "X-Forwarded-For");
    assert_eq!(canonical_header_key("a4k-9x"), "A4k-9x");
}

#[test]
fn test_start_line() {
    assert_eq!(start_line("GET", "/"), "GET / HTTP/1.1");
    assert_eq!(start_line("POST", "/a?b=c"), "POST /a?b=c HTTP/1.1");
}

#[tokio::test]
async fn test_write_http_line_appends_crlf() {
    let mut out: Vec<u8> = Vec::new();
    write_http_line(&mut out, "GET / HTTP/1.1").await.unwrap();
    write_http_header(&mut out, "user-agent", "turtle").await.unwrap();
    assert_eq!(out, b"GET / HTTP/1.1\r\nUser-Agent: turtle\r\n");
}

#[test]
fn test_default_user_agents() {
    assert_eq!(DEFAULT_USER_AGENTS.len(), 4);
    assert!(DEFAULT_USER_AGENTS.iter().all(|ua| ua.starts_with("Mozilla/5.0")));
}

#[test]
fn test_rand_index_range() {
    assert_eq!(rand_index(0), 0);
    assert_eq!(rand_index(1), 0);

    let mut seen = [false; 7];
    for _ in 0..2000 {
        let v = rand_index(7);
        assert!(v < 7);
        seen[v] = true;
    }
    assert!(seen.iter().all(|s| *s), "every index should come up");
}
