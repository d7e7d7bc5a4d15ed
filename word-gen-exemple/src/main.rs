use word_gen_core::model::word_model::MarkovWordModel;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // Corpus path and context length can be given on the command line
    let corpus_path = std::env::args().nth(1).unwrap_or_else(|| "./data/words.txt".to_owned());
    let order: usize = std::env::args().nth(2).map(|s| s.parse()).transpose()?.unwrap_or(3);

    // Build the model from the corpus, or load the .bin cache written
    // beside it by a previous run
    log::info!("Building model from '{corpus_path}' with order {order}");
    let model = MarkovWordModel::from_corpus_file(&corpus_path, order)?;

    // The randomness source is explicit; pass a seeded StdRng instead
    // for reproducible output
    let mut rng = rand::rng();

    // Generate 10 complete words
    for i in 0..10 {
        match model.generate_word(&mut rng) {
            Some(word) => println!("Generated word {}: {}", i + 1, word),
            None => println!("The model is empty, nothing to generate"),
        }
    }

    // Generate an opening fragment of exactly `order` characters
    if let Some(start) = model.generate_start(&mut rng) {
        println!("Start fragment: {start}");
    }

    // Show the next-character probabilities for a user-style prior;
    // unknown endings are a normal outcome, not an error
    let prior = "a";
    match model.get_options(prior, 1) {
        Some(options) => {
            let formatted: Vec<String> = options
                .iter()
                .map(|(c, pc)| {
                    if *c == model.end_char() {
                        format!("[end]: {pc}%")
                    } else {
                        format!("'{c}': {pc}%")
                    }
                })
                .collect();
            println!("Options after '{}': {}", prior, formatted.join(", "));
        }
        None => println!("Ending of '{prior}' has no options in model."),
    }

    // Grow a prefix one character at a time, as an interactive caller would
    let mut prior = String::new();
    while let Some(next) = model.generate_character(&prior, true, &mut rng) {
        if next.ends_with(model.end_char()) {
            println!("Word grown character by character: {}", &next[..next.len() - 1]);
            break;
        }
        prior = next;
    }

    // Persisted model round trip
    let saved_path = std::env::temp_dir().join("word-gen-exemple.dat");
    model.save(&saved_path)?;
    let reloaded = MarkovWordModel::load(&saved_path)?;
    log::info!("Reloaded model from '{}' with order {}", saved_path.display(), reloaded.order());
    if let Some(word) = reloaded.generate_word(&mut rng) {
        println!("Word from reloaded model: {word}");
    }

    Ok(())
}
