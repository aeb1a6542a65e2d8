//! Tab-delimited result output.

use std::fs::File;
use std::io::{stderr, stdout, Write};
use std::path::Path;

use kseek_core::types::OutputHit;

/// Creates a `Writer`: empty name or `"stdout"` writes to stdout, `"stderr"`
/// to stderr, anything else to a freshly created file.
pub fn out_writer(out_fname: &str) -> std::io::Result<Box<dyn Write>> {
    match out_fname {
        "" | "stdout" => Ok(Box::new(stdout()) as Box<dyn Write>),
        "stderr" => Ok(Box::new(stderr()) as Box<dyn Write>),
        _ => {
            let file = File::create(Path::new(out_fname))?;
            Ok(Box::new(file) as Box<dyn Write>)
        }
    }
}

/// Writes hits as tab-separated rows.
///
/// The column set follows the search depth: stage-1 scores are always
/// reported, chain coordinates from stage 2 onward, and alignment columns
/// only when stage 3 ran with traceback.
pub fn write_results_tab(
    out: &mut impl Write,
    hits: &[OutputHit],
    mode: u8,
    traceback: bool,
) -> std::io::Result<()> {
    write!(
        out,
        "# query_id\taccession\tstrand\tq_start\tq_end\ts_start\ts_end\tchain_score\tstage1_score\tvolume"
    )?;
    if mode >= 3 {
        write!(out, "\taln_score")?;
        if traceback {
            write!(out, "\tpident\tnident\tnmismatch\tcigar")?;
        }
    }
    writeln!(out)?;

    for h in hits {
        write!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            h.query_id,
            h.accession,
            h.strand,
            h.q_start,
            h.q_end,
            h.s_start,
            h.s_end,
            h.score,
            h.stage1_score,
            h.volume
        )?;
        if mode >= 3 {
            write!(out, "\t{}", h.aln_score)?;
            if traceback {
                write!(out, "\t{:.2}\t{}\t{}\t{}", h.pident, h.nident, h.nmismatch, h.cigar)?;
            }
        }
        writeln!(out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_hit() -> OutputHit {
        OutputHit {
            query_id: "q1".into(),
            accession: "ACC_1".into(),
            strand: '+',
            q_start: 0,
            q_end: 32,
            s_start: 0,
            s_end: 32,
            score: 26,
            stage1_score: 26,
            volume: 0,
            ..Default::default()
        }
    }

    #[test]
    fn stage2_rows_have_ten_columns() {
        let mut buf = Vec::new();
        write_results_tab(&mut buf, &[sample_hit()], 2, false).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("# query_id"));
        let row = lines.next().unwrap();
        assert_eq!(row.split('\t').count(), 10);
        assert!(row.starts_with("q1\tACC_1\t+\t0\t32\t0\t32\t26\t26\t0"));
    }

    #[test]
    fn traceback_rows_carry_alignment_columns() {
        let mut hit = sample_hit();
        hit.aln_score = 160;
        hit.pident = 100.0;
        hit.nident = 32;
        hit.cigar = "32=".into();
        let mut buf = Vec::new();
        write_results_tab(&mut buf, &[hit], 3, true).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let row = text.lines().nth(1).unwrap();
        assert_eq!(row.split('\t').count(), 15);
        assert!(row.ends_with("160\t100.00\t32\t0\t32="));
    }
}
