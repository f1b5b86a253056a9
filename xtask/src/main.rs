use std::time::{Duration, Instant};
use rand::{seq::SliceRandom, thread_rng};
use reqwest::Client;
use hdrhistogram::Histogram;


// Load generator for the proxy: `cargo run -p xtask -- [url] [clients] [total]`
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut argv = std::env::args().skip(1);
    let url = argv.next().unwrap_or_else(|| "http://127.0.0.1:8000/generate".to_string());
    let clients: usize = argv.next().map(|s| s.parse()).transpose()?.unwrap_or(4);
    let total: usize = argv.next().map(|s| s.parse()).transpose()?.unwrap_or(40);
    let inputs = vec![
        "What are first-line treatments for type 2 diabetes?",
        "List common side effects of metformin.",
        "How is community-acquired pneumonia diagnosed?",
        "Explain the mechanism of action of ACE inhibitors.",
        "What are red-flag symptoms in a patient with headache?",
        "Summarize the CHA2DS2-VASc score.",
    ];

    let client = Client::builder().timeout(Duration::from_secs(120)).build()?;
    let mut hist = Histogram::<u64>::new(3)?;
    let mut upstream_hist = Histogram::<u64>::new(3)?;
    let mut errors = 0usize;

    let start = Instant::now();
    let mut tasks = vec![];
    for _ in 0..clients {
        let client = client.clone();
        let url = url.clone();
        let inputs = inputs.clone();
        tasks.push(tokio::spawn(async move {
            let mut latencies = vec![];
            let mut reported = vec![];
            let mut errs = 0;
            for _ in 0..(total / clients.max(1)) {
                let input = {
                    let mut rng = thread_rng();
                    inputs.choose(&mut rng).copied().unwrap_or("ping")
                };
                let t0 = Instant::now();
                let res = client.post(&url).json(&serde_json::json!({ "input": input })).send().await;
                let dur = t0.elapsed();
                match res {
                    Ok(r) if r.status().is_success() => {
                        latencies.push(dur);
                        if let Ok(body) = r.json::<serde_json::Value>().await {
                            if let Some(ms) = body["latency_ms"].as_u64() {
                                reported.push(ms);
                            }
                        }
                    }
                    _ => errs += 1,
                }
            }
            (latencies, reported, errs)
        }));
    }

    for t in tasks {
        let (ls, rs, e) = t.await?;
        for d in ls { hist.record(d.as_millis() as u64).ok(); }
        for ms in rs { upstream_hist.record(ms).ok(); }
        errors += e;
    }

    println!("ran {} reqs in {:?}", total, start.elapsed());
    println!("errors: {}", errors);
    println!("p50: {} ms (upstream {} ms)", hist.value_at_quantile(0.50), upstream_hist.value_at_quantile(0.50));
    println!("p95: {} ms (upstream {} ms)", hist.value_at_quantile(0.95), upstream_hist.value_at_quantile(0.95));
    println!("p99: {} ms (upstream {} ms)", hist.value_at_quantile(0.99), upstream_hist.value_at_quantile(0.99));
    Ok(())
}
