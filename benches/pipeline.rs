use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use jsclean::escape::escape_js_string;
use jsclean::pipeline::{Options, normalize, run};

const ALPHABET: &str =
    "!#$%&()*+,-./0123456789:;<=>?@ABCDEFGHIJKLMNOPQRSTUVWXYZ[]^_`abcdefghijklmnopqrstuvwxyz{|}~";

const ALIASES: &str =
    r#"{get"x"(){return String},get"y"(){return console},get 0x2(){return Utf8}}"#;

fn decoder(name: &str) -> String {
    format!(
        r#"function {name}(...a) {{
  a.length = 1;
  var_65(a[1] = "{ALPHABET}", a[2] = "" + (a[0] || ""), a[3] = a[2].length, a[4] = [], a[5] = 0, a[6] = 0, a[7] = -1);
  for (a[8] = 0; a[8] < a[3]; a[8]++) {{
    a[9] = a[1].indexOf(a[2][a[8]]);
    if (a[9] === -1) continue;
    if (a[7] < 0) {{
      a[7] = a[9];
    }} else {{
      var_65(a[7] += a[9] * 91, a[5] |= a[7] << a[6], a[6] += (a[7] & 8191) > 88 ? 13 : 14);
      do {{
        var_65(a[4].push(a[5] & 255), a[5] >>= 8, a[6] -= 8);
      }} while (a[6] > 7);
      a[7] = -1;
    }}
  }}
  if (a[7] > -1) {{
    a[4].push((a[5] | a[7] << a[6]) & 255);
  }}
  return E[0x2](a[4]);
}}
"#
    )
}

/// A packed script with `n` decoders and a call site for each.
fn packed(n: usize) -> String {
    let mut body = String::from("function var_65() {}\n");
    for i in 0..n {
        body.push_str(&decoder(&format!("dec{i}")));
        body.push_str(&format!("E.y.log(E[\"x\"](dec{i}(T[{}])));\n", i % 4));
    }
    body.push_str("const T = [\"a\" + \"b\", \"cd\", \"e\", \"fgh\"];\n");
    format!(
        "(function(){{Function(\"E\",\"{}\")({ALIASES});}})();",
        escape_js_string(&body)
    )
}

fn bench_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("run");
    let opts = Options::default();
    for n in [1, 10, 50] {
        let src = packed(n);
        group.bench_with_input(BenchmarkId::new("decoders", n), &src, |b, src| {
            b.iter(|| run(black_box(src), &opts).unwrap())
        });
    }
    group.finish();
}

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize");
    let opts = Options::default();
    for n in [1, 10, 50] {
        let cleaned = run(&packed(n), &opts).unwrap().cleaned;
        group.bench_with_input(BenchmarkId::new("already_clean", n), &cleaned, |b, src| {
            b.iter(|| normalize(black_box(src), &opts).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_run, bench_normalize);
criterion_main!(benches);
