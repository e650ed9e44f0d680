use csv_core::{ReadFieldResult, ReaderBuilder};
use mincomplex::*;
use std::env;
use std::error::Error;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::process;
use std::str;

/// Parses a binary string, most significant bit first, into a state or mask.
fn parse_bits(field: &str) -> Option<(u64, u32)> {
    if field.is_empty() || field.len() > MAX_WIDTH as usize {
        return None;
    }
    let mut value = 0u64;
    for c in field.chars() {
        value <<= 1;
        match c {
            '0' => {}
            '1' => value |= 1,
            _ => return None,
        }
    }
    Some((value, field.len() as u32))
}

fn bad_data(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

/// Reads tab-separated observations into a frequency table. Each record is a
/// binary state string, optionally followed by a repeat count; records with
/// the same state accumulate. Returns the table and the state width.
fn load_observations<I: Read>(mut input: I) -> io::Result<(FrequencyTable, u32)> {
    let mut inputbuf = [0; 16384];
    let mut fieldbuf = [0; 1024];
    let mut fieldlen = 0;
    let mut state = None;
    let mut count = 1u64;
    let mut width = 0u32;
    let mut table = FrequencyTable::new();
    let mut tsv = ReaderBuilder::new().delimiter(b'\t').build();

    loop {
        let read = input.read(&mut inputbuf)?;
        let mut bytes = &inputbuf[..read];
        loop {
            let (result, nin, nout) = tsv.read_field(bytes, &mut fieldbuf[fieldlen..]);
            bytes = &bytes[nin..];
            fieldlen += nout;
            match result {
                ReadFieldResult::InputEmpty => break,
                ReadFieldResult::OutputFull => {
                    return Err(bad_data(format!("field too long on line {}", tsv.line())));
                }
                ReadFieldResult::Field { record_end } => {
                    let field = str::from_utf8(&fieldbuf[..fieldlen])
                        .map_err(|e| bad_data(e.to_string()))?
                        .trim();

                    if !field.is_empty() {
                        if state.is_none() {
                            let (value, w) = parse_bits(field).ok_or_else(|| {
                                bad_data(format!(
                                    "bad state '{}' on line {}",
                                    field,
                                    tsv.line()
                                ))
                            })?;
                            if width == 0 {
                                width = w;
                            } else if width != w {
                                return Err(bad_data(format!(
                                    "state width changed from {} to {} on line {}",
                                    width,
                                    w,
                                    tsv.line()
                                )));
                            }
                            state = Some(value);
                        } else {
                            count = field.parse().map_err(|_| {
                                bad_data(format!(
                                    "bad count '{}' on line {}",
                                    field,
                                    tsv.line()
                                ))
                            })?;
                        }
                    }
                    fieldlen = 0;

                    if record_end {
                        if let Some(value) = state.take() {
                            if count > 0 {
                                table.add_cell(value, count);
                            }
                        }
                        count = 1;
                    }
                }
                ReadFieldResult::End => {
                    table.shrink_to_fit();
                    return Ok((table, width));
                }
            }
        }
    }
}

/// Reads a file of binary rows into bitmasks, one per line. Blank lines and
/// `#` comments are skipped; rows longer than `width` are truncated to their
/// first `width` characters.
fn read_masks(path: &str, width: u32) -> io::Result<Vec<u64>> {
    let file = File::open(path)?;
    let mut masks = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        let token = line.trim();
        if token.is_empty() || token.starts_with('#') {
            continue;
        }
        if !token.is_ascii() {
            return Err(bad_data(format!("bad bitmask '{}' in {}", token, path)));
        }
        let token = if token.len() > width as usize {
            &token[..width as usize]
        } else {
            token
        };
        let (mask, _) = parse_bits(token)
            .ok_or_else(|| bad_data(format!("bad bitmask '{}' in {}", token, path)))?;
        masks.push(mask);
    }
    Ok(masks)
}

fn print_model_report(
    scorer: &ModelScorer<'_>,
    partition: &Partition,
) -> Result<(), Box<dyn Error>> {
    let score = scorer.score(partition)?;
    let width = scorer.basis_size() as usize;

    println!("model with {} parts:", partition.len());
    println!("\t LogL = {:.6}", score.log_likelihood);
    println!(
        "\t C_param = {:.6} \t C_geom = {:.6}",
        score.param_complexity, score.geom_complexity
    );
    println!("\t total complexity = {:.6}", score.total_complexity());
    println!("\t MDL = {:.6}", score.description_length());
    println!("\t LogE = {:.6}", score.log_evidence);
    println!();
    println!("## 1:part_int \t 2:part_binary \t 3:LogL \t 4:C_param \t 5:C_geom \t 6:C_tot \t 7:LogE");
    for mask in partition.iter() {
        let m = mask.count_ones();
        let c_param = param_complexity(m, scorer.sample_size());
        let c_geom = geom_complexity(m);
        println!(
            "{} \t {:0w$b} \t {:.6} \t {:.6} \t {:.6} \t {:.6} \t {:.6}",
            mask,
            mask,
            scorer.block_log_likelihood(mask)?,
            c_param,
            c_geom,
            c_param + c_geom,
            scorer.block_log_evidence(mask)?,
            w = width
        );
    }
    println!();
    Ok(())
}

/// Scores the two families of baseline models: element-by-element independent
/// models and growing single-block models.
fn print_baselines(scorer: &ModelScorer<'_>) -> Result<(), Box<dyn Error>> {
    println!("successive independent models:");
    let mut blocks = Vec::new();
    for i in 0..scorer.basis_size() {
        blocks.push(1u64 << i);
        let score = scorer.score(&Partition::from_blocks(&blocks))?;
        println!(
            "\t + operator {} \t LogE = {:.6} \t LogL = {:.6}",
            i + 1,
            score.log_evidence,
            score.log_likelihood
        );
    }

    println!("successive sub-complete models:");
    let mut mask = 0u64;
    for i in 0..scorer.basis_size() {
        mask |= 1u64 << i;
        let score = scorer.score(&Partition::from_blocks(&[mask]))?;
        println!(
            "\t + operator {} \t LogE = {:.6} \t LogL = {:.6}",
            i + 1,
            score.log_evidence,
            score.log_likelihood
        );
    }
    println!();
    Ok(())
}

fn print_search(outcome: &SearchOutcome, scorer: &ModelScorer<'_>) -> Result<(), Box<dyn Error>> {
    println!("## 1:partition \t 2:LogE \t 3:outcome \t 4:visit");
    for record in &outcome.records {
        println!("{}", record);
    }
    println!("models compared: {}", outcome.visited);
    if outcome.models.len() > 1 {
        println!("models tied for best: {}", outcome.models.len());
    }
    print_model_report(scorer, outcome.best())
}

fn usage() -> ! {
    eprintln!("usage: mincomplex DATA [RANK] [--basis FILE] [--model FILE]");
    eprintln!("  DATA          tab-separated observations, STATE [COUNT]; '-' reads stdin");
    eprintln!("  RANK          search partitions of up to this many basis elements");
    eprintln!("  --basis FILE  binary rows defining the basis operators");
    eprintln!("  --model FILE  binary rows defining a partition to evaluate directly");
    process::exit(2);
}

fn main() -> Result<(), Box<dyn Error>> {
    let mut data = None;
    let mut rank_arg = None;
    let mut basis_path = None;
    let mut model_path = None;
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--basis" => basis_path = Some(args.next().unwrap_or_else(|| usage())),
            "--model" => model_path = Some(args.next().unwrap_or_else(|| usage())),
            _ if data.is_none() => data = Some(arg),
            _ if rank_arg.is_none() => match arg.parse::<u32>() {
                Ok(r) => rank_arg = Some(r),
                Err(_) => usage(),
            },
            _ => usage(),
        }
    }
    let data = match data {
        Some(data) => data,
        None => usage(),
    };

    let (observed, width) = if data == "-" {
        load_observations(io::stdin().lock())?
    } else {
        load_observations(File::open(&data)?)?
    };
    if observed.is_empty() {
        return Err(Box::new(bad_data(format!("no observations in {}", data))));
    }
    println!(
        "data: {} variables, {} distinct states, N = {}",
        width,
        observed.len(),
        observed.sample_size()
    );
    println!();

    let basis: Vec<u64> = match &basis_path {
        Some(path) => read_masks(path, width)?,
        None => (0..width).map(|i| 1u64 << i).collect(),
    };
    let basis_size = basis.len() as u32;

    // The searches run against the data re-expressed in the chosen basis;
    // with the default basis this projection is the identity.
    let table = observed.project_onto_basis(&basis);
    let scorer = ModelScorer::new(&table, width, basis_size)?;

    print_baselines(&scorer)?;

    if let Some(path) = &model_path {
        let partition = Partition::from_blocks(&read_masks(path, width)?);
        let (valid, rank) = partition.check();
        if !valid {
            return Err(Box::new(ModelError::NotAPartition));
        }
        println!("hand-specified model, rank {}:", rank);
        print_model_report(&scorer, &partition)?;
        println!("## 1:state \t 2:empirical \t 3:model");
        for p in state_probabilities(&scorer, &partition)? {
            println!(
                "{:0w$b} \t {:.6} \t {:.6}",
                p.state,
                p.empirical,
                p.model,
                w = basis_size as usize
            );
        }
        println!();
    }

    let rank = rank_arg.unwrap_or(basis_size);

    println!("=== best model of rank {} ===", rank);
    print_search(&search_fixed_rank(&scorer, rank)?, &scorer)?;

    println!("=== best model over basis prefixes up to rank {} ===", rank);
    print_search(&search_all_ranks_ordered(&scorer, rank)?, &scorer)?;

    println!("=== best model over any basis subset up to rank {} ===", rank);
    print_search(&search_all_ranks_any_subset(&scorer, rank)?, &scorer)?;

    Ok(())
}
