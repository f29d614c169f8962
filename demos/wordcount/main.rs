use std::env;
use std::sync::{Arc, Mutex};

/// Runs `f` and prints its wall-clock duration.
fn timeit<F>(f: F)
where
    F: FnOnce(),
{
    let start = std::time::Instant::now();
    f();
    let duration = std::time::Instant::now().duration_since(start);
    println!("Time: {}", duration.as_secs_f64());
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 4 {
        panic!("Correct usage: $ ./{:?} <nmappers> <nreducers> <file...>", args[0]);
    }
    let num_mappers: usize = args[1].parse().expect("nmappers must be an integer");
    let num_reducers: usize = args[2].parse().expect("nreducers must be an integer");
    let files: Vec<String> = args[3..].to_vec();

    let counts = Arc::new(Mutex::new(std::collections::HashMap::new()));
    let counts_for_reducer = Arc::clone(&counts);

    timeit(|| {
        mapreduce_rt::run(
            &files,
            |path: &std::path::Path| {
                let Ok(contents) = std::fs::read_to_string(path) else {
                    return;
                };
                for word in contents.split_whitespace() {
                    mapreduce_rt::emit(&word.to_lowercase(), "1");
                }
            },
            num_mappers,
            move |key: &str, partition: usize| {
                let mut n = 0usize;
                while mapreduce_rt::get_next(key, partition).is_some() {
                    n += 1;
                }
                counts_for_reducer.lock().unwrap().insert(key.to_owned(), n);
            },
            num_reducers,
        )
        .expect("word count job failed to start")
    });

    let counts = counts.lock().unwrap();
    let mut words: Vec<(&String, &usize)> = counts.iter().collect();
    words.sort_unstable_by_key(|(_, count)| std::cmp::Reverse(**count));
    for (word, count) in words.iter().take(20) {
        println!("{word}: {count}");
    }
}
